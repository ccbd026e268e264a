//! Tier facades: an agent's view of its archival and recall stores.
//!
//! Each facade is bound to one agent and caches the tier's size so the
//! system prompt can show it without a store round-trip. The cache is
//! refreshed by every insert made through the facade and by [`refresh`].
//!
//! [`refresh`]: RecallMemory::refresh

use chrono::{DateTime, Utc};
use memloop_core::error::MemoryError;
use memloop_core::memory::{ArchivalStore, MessageFilter, MessageStore, Page, Passage};
use memloop_core::message::Message;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Page size used by the built-in search functions.
pub const DEFAULT_PAGE_SIZE: usize = 5;

/// Normalize a backend failure to `StorageUnavailable`.
fn unavailable(err: MemoryError) -> MemoryError {
    match err {
        MemoryError::StorageUnavailable(_) => err,
        other => MemoryError::StorageUnavailable(other.to_string()),
    }
}

/// Offset of page `page`. A page too large to address lands past the end.
fn page_offset(page: usize, page_size: usize) -> usize {
    page.saturating_mul(page_size)
}

/// Archival memory for one agent.
pub struct ArchivalMemory {
    store: Arc<dyn ArchivalStore>,
    agent_id: Uuid,
    user_id: Uuid,
    cached_count: AtomicUsize,
}

impl ArchivalMemory {
    /// A facade with an unknown (zero) cached count. Call [`Self::refresh`]
    /// or use [`Self::open`] to load it.
    pub fn new(store: Arc<dyn ArchivalStore>, agent_id: Uuid, user_id: Uuid) -> Self {
        Self {
            store,
            agent_id,
            user_id,
            cached_count: AtomicUsize::new(0),
        }
    }

    /// A facade with its count loaded. A store that can't be reached yields
    /// a zero count and a warning.
    pub async fn open(store: Arc<dyn ArchivalStore>, agent_id: Uuid, user_id: Uuid) -> Self {
        let tier = Self::new(store, agent_id, user_id);
        if let Err(e) = tier.refresh().await {
            warn!(agent_id = %agent_id, error = %e, "Archival store unavailable, count starts at 0");
        }
        tier
    }

    /// Cached number of passages.
    pub fn count(&self) -> usize {
        self.cached_count.load(Ordering::Relaxed)
    }

    /// Re-read the count from the store.
    pub async fn refresh(&self) -> Result<usize, MemoryError> {
        let n = self.store.count(self.agent_id).await.map_err(unavailable)?;
        self.cached_count.store(n, Ordering::Relaxed);
        Ok(n)
    }

    /// Save a passage. Returns its id.
    pub async fn insert(&self, text: &str) -> Result<String, MemoryError> {
        let passage = Passage::new(self.agent_id, self.user_id, text);
        let id = passage.id.clone();
        self.store.insert(passage).await.map_err(unavailable)?;
        self.refresh().await?;
        debug!(agent_id = %self.agent_id, passage = %id, "Archival passage inserted");
        Ok(id)
    }

    /// Page `page` (0-based) of passages containing `query`.
    pub async fn query(
        &self,
        query: &str,
        page: usize,
        page_size: usize,
    ) -> Result<Page<Passage>, MemoryError> {
        self.store
            .search(self.agent_id, query, page_offset(page, page_size), page_size)
            .await
            .map_err(unavailable)
    }
}

/// Recall memory (full message history) for one agent.
pub struct RecallMemory {
    store: Arc<dyn MessageStore>,
    agent_id: Uuid,
    cached_count: AtomicUsize,
}

impl RecallMemory {
    pub fn new(store: Arc<dyn MessageStore>, agent_id: Uuid) -> Self {
        Self {
            store,
            agent_id,
            cached_count: AtomicUsize::new(0),
        }
    }

    pub async fn open(store: Arc<dyn MessageStore>, agent_id: Uuid) -> Self {
        let tier = Self::new(store, agent_id);
        if let Err(e) = tier.refresh().await {
            warn!(agent_id = %agent_id, error = %e, "Recall store unavailable, count starts at 0");
        }
        tier
    }

    /// Cached number of stored messages.
    pub fn count(&self) -> usize {
        self.cached_count.load(Ordering::Relaxed)
    }

    pub async fn refresh(&self) -> Result<usize, MemoryError> {
        let n = self.store.count(self.agent_id).await.map_err(unavailable)?;
        self.cached_count.store(n, Ordering::Relaxed);
        Ok(n)
    }

    /// Persist messages in order. Re-appending a stored message is a no-op.
    ///
    /// Once every message is stored, a failure to re-read the count is only
    /// logged: the cached count is advanced by the batch size instead.
    pub async fn append_all(&self, messages: &[Message]) -> Result<(), MemoryError> {
        for message in messages {
            self.store.append_message(message).await.map_err(unavailable)?;
        }
        if let Err(e) = self.refresh().await {
            warn!(agent_id = %self.agent_id, error = %e, "Recall count unavailable, estimating");
            self.cached_count.fetch_add(messages.len(), Ordering::Relaxed);
        }
        Ok(())
    }

    pub async fn update(&self, message: &Message) -> Result<(), MemoryError> {
        self.store.update_message(message).await.map_err(unavailable)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Message>, MemoryError> {
        self.store.get_message(id).await.map_err(unavailable)
    }

    /// Page `page` (0-based) of messages matching `filter`.
    pub async fn query(
        &self,
        filter: &MessageFilter,
        page: usize,
        page_size: usize,
    ) -> Result<Page<Message>, MemoryError> {
        self.store
            .search(self.agent_id, filter, page_offset(page, page_size), page_size)
            .await
            .map_err(unavailable)
    }

    /// Page `page` of user/assistant messages created within `[start, end]`.
    pub async fn date_query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: usize,
        page_size: usize,
    ) -> Result<Page<Message>, MemoryError> {
        self.store
            .search_by_date(self.agent_id, start, end, page_offset(page, page_size), page_size)
            .await
            .map_err(unavailable)
    }
}
