//! File-based stores: persistent JSON-lines storage.
//!
//! One directory holds three files, each with one JSON object per line:
//! - `messages.jsonl`: recall memory (`Message`)
//! - `archival.jsonl`: archival passages (`Passage`)
//! - `agents.jsonl`: agent checkpoints (`AgentState`)
//!
//! Everything is loaded on open. New records are appended to the end of
//! their file; replacing a record rewrites the file.

use async_trait::async_trait;
use memloop_core::agent::{AgentState, AgentStore};
use memloop_core::error::MemoryError;
use memloop_core::memory::{ArchivalStore, MessageFilter, MessageStore, Page, Passage};
use memloop_core::message::Message;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::in_memory::passage_matches;

const MESSAGES_FILE: &str = "messages.jsonl";
const ARCHIVAL_FILE: &str = "archival.jsonl";
const AGENTS_FILE: &str = "agents.jsonl";

/// A file-backed store for messages, passages and agent checkpoints.
pub struct FileStore {
    dir: PathBuf,
    messages: Arc<RwLock<Vec<Message>>>,
    passages: Arc<RwLock<Vec<Passage>>>,
    agents: Arc<RwLock<Vec<AgentState>>>,
}

impl FileStore {
    /// Open the store in `dir`. Missing files start empty (created on
    /// first write); corrupted lines are skipped with a warning.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let messages: Vec<Message> = load_jsonl(&dir.join(MESSAGES_FILE));
        let passages: Vec<Passage> = load_jsonl(&dir.join(ARCHIVAL_FILE));
        let agents: Vec<AgentState> = load_jsonl(&dir.join(AGENTS_FILE));
        debug!(
            path = %dir.display(),
            messages = messages.len(),
            passages = passages.len(),
            agents = agents.len(),
            "File store loaded"
        );
        Self {
            dir,
            messages: Arc::new(RwLock::new(messages)),
            passages: Arc::new(RwLock::new(passages)),
            agents: Arc::new(RwLock::new(agents)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<(), MemoryError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            MemoryError::Storage(format!("Failed to create data directory: {e}"))
        })
    }

    /// Append one record to `file`.
    fn append_line<T: Serialize>(&self, file: &str, record: &T) -> Result<(), MemoryError> {
        self.ensure_dir()?;
        let line = serde_json::to_string(record)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize record: {e}")))?;
        let mut handle = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file))
            .map_err(|e| MemoryError::Storage(format!("Failed to open {file}: {e}")))?;
        writeln!(handle, "{line}")
            .map_err(|e| MemoryError::Storage(format!("Failed to write {file}: {e}")))
    }

    /// Rewrite `file` with `records`.
    fn rewrite<T: Serialize>(&self, file: &str, records: &[T]) -> Result<(), MemoryError> {
        self.ensure_dir()?;
        let mut content = String::new();
        for record in records {
            let line = serde_json::to_string(record)
                .map_err(|e| MemoryError::Storage(format!("Failed to serialize record: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }
        std::fs::write(self.dir.join(file), &content)
            .map_err(|e| MemoryError::Storage(format!("Failed to write {file}: {e}")))
    }
}

fn load_jsonl<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<T>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping corrupted record");
                None
            }
        })
        .collect()
}

#[async_trait]
impl MessageStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get_message(&self, id: &str) -> Result<Option<Message>, MemoryError> {
        let messages = self.messages.read().await;
        Ok(messages.iter().find(|m| m.id == id).cloned())
    }

    async fn append_message(&self, message: &Message) -> Result<(), MemoryError> {
        let mut messages = self.messages.write().await;
        match messages.iter().position(|m| m.id == message.id) {
            Some(i) if messages[i] == *message => Ok(()),
            Some(i) => {
                messages[i] = message.clone();
                self.rewrite(MESSAGES_FILE, &messages)
            }
            None => {
                self.append_line(MESSAGES_FILE, message)?;
                messages.push(message.clone());
                Ok(())
            }
        }
    }

    async fn update_message(&self, message: &Message) -> Result<(), MemoryError> {
        let mut messages = self.messages.write().await;
        let Some(i) = messages.iter().position(|m| m.id == message.id) else {
            return Err(MemoryError::Storage(format!(
                "cannot update unknown message {}",
                message.id
            )));
        };
        if messages[i] == *message {
            return Ok(());
        }
        messages[i] = message.clone();
        self.rewrite(MESSAGES_FILE, &messages)
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
impl ArchivalStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn insert(&self, passage: Passage) -> Result<(), MemoryError> {
        let mut passages = self.passages.write().await;
        self.append_line(ARCHIVAL_FILE, &passage)?;
        passages.push(passage);
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
impl AgentStore for FileStore {
    fn name(&self) -> &str {
        "file"
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
        match agents.iter().position(|a| a.id == state.id) {
            Some(i) if agents[i] == *state => return Ok(()),
            Some(i) => agents[i] = state.clone(),
            None => agents.push(state.clone()),
        }
        self.rewrite(AGENTS_FILE, &agents)
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
