//! Shared test helpers for engine tests.

use crate::agent::{Agent, AgentDeps, AgentSettings};
use crate::preset::Preset;
use memloop_core::agent::{EmbeddingConfig, LlmConfig};
use memloop_core::error::ProviderError;
use memloop_core::interface::RecordingInterface;
use memloop_core::message::{Message, MessageToolCall};
use memloop_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use memloop_memory::InMemoryStore;
use memloop_tools::FunctionCatalog;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// A provider that replays scripted results and records every request.
///
/// Once the script runs out every call fails with a 500.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replies(responses: Vec<ProviderResponse>) -> Self {
        Self::new(responses.into_iter().map(Ok).collect())
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(ProviderError::ApiError {
                    status_code: 500,
                    message: "script exhausted".into(),
                })
            })
    }
}

/// A response with inner monologue and function calls.
pub fn reply(thought: &str, calls: Vec<MessageToolCall>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(thought).with_tool_calls(calls),
        usage: Some(Usage {
            prompt_tokens: 100,
            completion_tokens: 20,
            total_tokens: 120,
        }),
        model: "mock-model".into(),
    }
}

/// A plain text response with no function calls.
pub fn text_reply(text: &str) -> ProviderResponse {
    reply(text, vec![])
}

pub fn call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall::new(name, args.to_string())
}

/// A `send_message` call.
pub fn say(text: &str) -> MessageToolCall {
    call("send_message", serde_json::json!({"message": text}))
}

/// Test settings: no first-message verification, no boot messages.
pub fn settings() -> AgentSettings {
    AgentSettings {
        verify_first_message: false,
        boot_messages: false,
        ..AgentSettings::default()
    }
}

pub struct Harness {
    pub agent: Agent,
    pub provider: Arc<ScriptedProvider>,
    pub store: Arc<InMemoryStore>,
    pub interface: Arc<RecordingInterface>,
}

pub async fn harness(script: Vec<ProviderResponse>) -> Harness {
    harness_with(ScriptedProvider::replies(script), settings()).await
}

pub async fn harness_with(provider: ScriptedProvider, settings: AgentSettings) -> Harness {
    let provider = Arc::new(provider);
    let store = Arc::new(InMemoryStore::new());
    let interface = Arc::new(RecordingInterface::new());
    let catalog = Arc::new(FunctionCatalog::builtin());
    let deps = AgentDeps::new(provider.clone(), catalog.clone(), interface.clone())
        .with_stores(store.clone(), store.clone(), store.clone());
    let preset = Preset::memgpt_chat(&catalog).unwrap();
    let agent = Agent::create(
        "tester",
        Uuid::new_v4(),
        &preset,
        LlmConfig::default(),
        EmbeddingConfig::default(),
        settings,
        deps,
    )
    .await
    .unwrap();
    Harness {
        agent,
        provider,
        store,
        interface,
    }
}
