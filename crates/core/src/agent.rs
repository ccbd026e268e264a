//! Agent configuration and persisted state types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MemoryError;

pub const DEFAULT_MODEL: &str = "llama3:70b";
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";
pub const DEFAULT_MODEL_WRAPPER: &str = "chatml";
pub const DEFAULT_CONTEXT_WINDOW: usize = 8192;

/// Which model an agent talks to and how big its context is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub model_endpoint: String,
    #[serde(default = "default_endpoint_type")]
    pub model_endpoint_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_wrapper: Option<String>,
    pub context_window: usize,
}

fn default_endpoint_type() -> String {
    "openai".into()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            model_endpoint: DEFAULT_ENDPOINT.into(),
            model_endpoint_type: default_endpoint_type(),
            model_wrapper: Some(DEFAULT_MODEL_WRAPPER.into()),
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_endpoint: Option<String>,
    pub embedding_model: String,
    pub embedding_dim: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            embedding_endpoint: Some(DEFAULT_ENDPOINT.into()),
            embedding_model: "nomic-text-embed".into(),
            embedding_dim: 384,
        }
    }
}

/// The checkpointed in-context state of an agent.
///
/// Keys match the persisted JSON: `persona`, `human`, `system`,
/// `functions` (schemas only, callables are linked at load time) and
/// `messages` (ordered in-context message ids).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateBag {
    pub persona: String,
    pub human: String,
    pub system: String,
    #[serde(default)]
    pub functions: Vec<serde_json::Value>,
    #[serde(default)]
    pub messages: Vec<String>,
}

/// Everything needed to restore an agent.
///
/// `persona_name` / `human_name` record where the initial texts came from;
/// the current texts are in `state`. The agent engine replaces this object
/// wholesale after every step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: Uuid,
    pub name: String,
    pub user_id: Uuid,
    pub persona_name: String,
    pub human_name: String,
    pub preset: String,
    pub llm_config: LlmConfig,
    pub embedding_config: EmbeddingConfig,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub state: StateBag,
}

impl AgentState {
    pub fn new(
        name: impl Into<String>,
        user_id: Uuid,
        persona_name: impl Into<String>,
        human_name: impl Into<String>,
        preset: impl Into<String>,
        llm_config: LlmConfig,
        embedding_config: EmbeddingConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            user_id,
            persona_name: persona_name.into(),
            human_name: human_name.into(),
            preset: preset.into(),
            llm_config,
            embedding_config,
            created_at: Utc::now(),
            state: StateBag::default(),
        }
    }
}

/// Persistent store for agent checkpoints.
#[async_trait]
pub trait AgentStore: Send + Sync {
    fn name(&self) -> &str;

    async fn get_agent_state(
        &self,
        agent_name: &str,
        user_id: Uuid,
    ) -> Result<Option<AgentState>, MemoryError>;

    /// Insert or replace the checkpoint for `state.id`.
    async fn save_agent_state(&self, state: &AgentState) -> Result<(), MemoryError>;

    /// Agent names owned by `user_id`, sorted.
    async fn list_agents(&self, user_id: Uuid) -> Result<Vec<String>, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_config_defaults() {
        let cfg = LlmConfig::default();
        assert_eq!(cfg.model, "llama3:70b");
        assert_eq!(cfg.context_window, 8192);
        assert_eq!(cfg.model_wrapper.as_deref(), Some("chatml"));
    }

    #[test]
    fn state_bag_uses_checkpoint_keys() {
        let bag = StateBag {
            persona: "p".into(),
            human: "h".into(),
            system: "s".into(),
            functions: vec![serde_json::json!({"name": "send_message"})],
            messages: vec!["m1".into()],
        };
        let json = serde_json::to_value(&bag).unwrap();
        for key in ["persona", "human", "system", "functions", "messages"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn agent_state_roundtrip() {
        let state = AgentState::new(
            "agent_1",
            Uuid::new_v4(),
            "sam_pov",
            "basic",
            "memgpt_chat",
            LlmConfig::default(),
            EmbeddingConfig::default(),
        );
        let json = serde_json::to_string(&state).unwrap();
        let back: AgentState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
