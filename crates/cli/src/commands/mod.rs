//! Subcommands and the wiring they share.

pub mod agents;
pub mod onboard;
pub mod run;

use memloop_config::AppConfig;
use memloop_core::agent::AgentStore;
use memloop_core::memory::{ArchivalStore, MessageStore};
use memloop_memory::{FileStore, InMemoryStore};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// The three stores an agent needs, backed by one backend.
#[derive(Clone)]
pub struct Stores {
    pub messages: Arc<dyn MessageStore>,
    pub archival: Arc<dyn ArchivalStore>,
    pub agents: Arc<dyn AgentStore>,
}

impl Stores {
    fn from_backend<S>(store: Arc<S>) -> Self
    where
        S: MessageStore + ArchivalStore + AgentStore + 'static,
    {
        Self {
            messages: store.clone(),
            archival: store.clone(),
            agents: store,
        }
    }

    pub fn open(config: &AppConfig) -> Self {
        match config.storage.backend.as_str() {
            "memory" => {
                tracing::info!("Using in-memory storage, nothing will be kept after exit");
                Self::from_backend(Arc::new(InMemoryStore::new()))
            }
            _ => {
                let dir = config.storage_dir();
                tracing::debug!(dir = %dir.display(), "Using file storage");
                Self::from_backend(Arc::new(FileStore::open(dir)))
            }
        }
    }
}

/// Where persona, human and system prompt overrides live.
pub fn prompts_dir(config: &AppConfig) -> PathBuf {
    config
        .memory
        .prompts_dir
        .clone()
        .unwrap_or_else(|| AppConfig::config_dir().join("prompts"))
}

/// The local user's id, created on first use.
pub fn local_user_id() -> Result<Uuid, Box<dyn std::error::Error>> {
    let path = AppConfig::config_dir().join("user_id");
    if let Ok(raw) = std::fs::read_to_string(&path) {
        match Uuid::parse_str(raw.trim()) {
            Ok(id) => return Ok(id),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Invalid user id, creating a new one"),
        }
    }
    let id = Uuid::new_v4();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, id.to_string())?;
    tracing::info!(user = %id, "Created local user id");
    Ok(id)
}
