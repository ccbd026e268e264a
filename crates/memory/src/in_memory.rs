//! In-memory stores, useful for testing and ephemeral sessions.

use async_trait::async_trait;
use memloop_core::agent::{AgentState, AgentStore};
use memloop_core::error::MemoryError;
use memloop_core::memory::{ArchivalStore, MessageFilter, MessageStore, Page, Passage};
use memloop_core::message::Message;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Messages, passages and agent checkpoints held in `Vec`s.
/// Nothing survives the process.
#[derive(Default)]
pub struct InMemoryStore {
    messages: Arc<RwLock<Vec<Message>>>,
    passages: Arc<RwLock<Vec<Passage>>>,
    agents: Arc<RwLock<Vec<AgentState>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

pub(crate) fn passage_matches(passage: &Passage, agent_id: Uuid, query: &str) -> bool {
    passage.agent_id == agent_id
        && (query.is_empty() || passage.text.to_lowercase().contains(&query.to_lowercase()))
}

#[async_trait]
impl MessageStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_message(&self, id: &str) -> Result<Option<Message>, MemoryError> {
        let messages = self.messages.read().await;
        Ok(messages.iter().find(|m| m.id == id).cloned())
    }

    async fn append_message(&self, message: &Message) -> Result<(), MemoryError> {
        let mut messages = self.messages.write().await;
        match messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message.clone(),
            None => messages.push(message.clone()),
        }
        Ok(())
    }

    async fn update_message(&self, message: &Message) -> Result<(), MemoryError> {
        let mut messages = self.messages.write().await;
        match messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => {
                *existing = message.clone();
                Ok(())
            }
            None => Err(MemoryError::Storage(format!(
                "cannot update unknown message {}",
                message.id
            ))),
        }
    }

    async fn count(&self, agent_id: Uuid) -> Result<usize, MemoryError> {
        let messages = self.messages.read().await;
        Ok(messages.iter().filter(|m| m.agent_id == Some(agent_id)).count())
    }

    async fn search(
        &self,
        agent_id: Uuid,
        filter: &MessageFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Message>, MemoryError> {
        let messages = self.messages.read().await;
        let hits: Vec<Message> = messages
            .iter()
            .filter(|m| m.agent_id == Some(agent_id) && filter.matches(m))
            .cloned()
            .collect();
        Ok(Page::slice(hits, offset, limit))
    }
}

#[async_trait]
impl ArchivalStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert(&self, passage: Passage) -> Result<(), MemoryError> {
        self.passages.write().await.push(passage);
        Ok(())
    }

    async fn search(
        &self,
        agent_id: Uuid,
        query: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Passage>, MemoryError> {
        let passages = self.passages.read().await;
        let hits: Vec<Passage> = passages
            .iter()
            .filter(|p| passage_matches(p, agent_id, query))
            .cloned()
            .collect();
        Ok(Page::slice(hits, offset, limit))
    }

    async fn count(&self, agent_id: Uuid) -> Result<usize, MemoryError> {
        let passages = self.passages.read().await;
        Ok(passages.iter().filter(|p| p.agent_id == agent_id).count())
    }
}

#[async_trait]
impl AgentStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_agent_state(
        &self,
        agent_name: &str,
        user_id: Uuid,
    ) -> Result<Option<AgentState>, MemoryError> {
        let agents = self.agents.read().await;
        Ok(agents
            .iter()
            .find(|a| a.name == agent_name && a.user_id == user_id)
            .cloned())
    }

    async fn save_agent_state(&self, state: &AgentState) -> Result<(), MemoryError> {
        let mut agents = self.agents.write().await;
        match agents.iter_mut().find(|a| a.id == state.id) {
            Some(existing) => *existing = state.clone(),
            None => agents.push(state.clone()),
        }
        Ok(())
    }

    async fn list_agents(&self, user_id: Uuid) -> Result<Vec<String>, MemoryError> {
        let agents = self.agents.read().await;
        let mut names: Vec<String> = agents
            .iter()
            .filter(|a| a.user_id == user_id)
            .map(|a| a.name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memloop_core::agent::{EmbeddingConfig, LlmConfig};

    fn agent_state(name: &str, user: Uuid) -> AgentState {
        AgentState::new(
            name,
            user,
            "sam_pov",
            "basic",
            "memgpt_chat",
            LlmConfig::default(),
            EmbeddingConfig::default(),
        )
    }

    #[tokio::test]
    async fn store_and_retrieve_message() {
        let store = InMemoryStore::new();
        let agent = Uuid::new_v4();
        let msg = Message::user("Rust is a systems language").owned_by(agent, Uuid::new_v4(), None);
        store.append_message(&msg).await.unwrap();

        let found = store.get_message(&msg.id).await.unwrap();
        assert_eq!(found, Some(msg));
        assert_eq!(MessageStore::count(&store, agent).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn messages_are_scoped_by_agent() {
        let store = InMemoryStore::new();
        let (a, b, user) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.append_message(&Message::user("pizza").owned_by(a, user, None)).await.unwrap();
        store.append_message(&Message::user("pizza").owned_by(b, user, None)).await.unwrap();

        let page = MessageStore::search(&store, a, &MessageFilter::text("pizza"), 0, 10)
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn update_unknown_message_fails() {
        let store = InMemoryStore::new();
        assert!(store.update_message(&Message::user("ghost")).await.is_err());
    }

    #[tokio::test]
    async fn update_replaces_content() {
        let store = InMemoryStore::new();
        let mut msg = Message::assistant("draft");
        store.append_message(&msg).await.unwrap();
        msg.content = "final".into();
        store.update_message(&msg).await.unwrap();
        assert_eq!(store.get_message(&msg.id).await.unwrap().unwrap().content, "final");
    }

    #[tokio::test]
    async fn empty_archival_query_matches_all() {
        let store = InMemoryStore::new();
        let (agent, user) = (Uuid::new_v4(), Uuid::new_v4());
        store.insert(Passage::new(agent, user, "one")).await.unwrap();
        store.insert(Passage::new(agent, user, "two")).await.unwrap();
        let page = ArchivalStore::search(&store, agent, "", 0, 10).await.unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn agent_checkpoints() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let mut state = agent_state("zeta", user);
        store.save_agent_state(&state).await.unwrap();
        store.save_agent_state(&agent_state("alpha", user)).await.unwrap();

        state.state.persona = "updated".into();
        store.save_agent_state(&state).await.unwrap();

        let loaded = store.get_agent_state("zeta", user).await.unwrap().unwrap();
        assert_eq!(loaded.state.persona, "updated");
        assert!(store.get_agent_state("zeta", Uuid::new_v4()).await.unwrap().is_none());
        assert_eq!(store.list_agents(user).await.unwrap(), vec!["alpha", "zeta"]);
    }
}
