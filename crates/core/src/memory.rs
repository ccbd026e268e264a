//! Memory domain: the in-context working set and the out-of-context stores.
//!
//! Core memory is two bounded text blocks (`persona` and `human`) that are
//! always rendered into the system message. Everything else lives in stores
//! the agent reaches through functions:
//! - Archival memory: free-form passages the agent chose to save
//! - Recall memory: every message ever exchanged, searchable by text or date

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MemoryError;
use crate::message::{Message, Role};

/// Label of the agent's self-description block.
pub const PERSONA: &str = "persona";
/// Label of the block describing the user.
pub const HUMAN: &str = "human";
/// Default character limit for a core memory block.
pub const DEFAULT_BLOCK_LIMIT: usize = 2000;

/// A labelled, size-limited text block.
///
/// `value` never holds more than `limit` characters: every edit checks the
/// result first and leaves the block untouched on overflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBlock {
    pub label: String,
    value: String,
    pub limit: usize,
}

impl MemoryBlock {
    /// An empty block.
    pub fn new(label: impl Into<String>, limit: usize) -> Self {
        Self {
            label: label.into(),
            value: String::new(),
            limit,
        }
    }

    /// A block holding `value`, or `Overflow` if it doesn't fit.
    pub fn with_value(
        label: impl Into<String>,
        value: impl Into<String>,
        limit: usize,
    ) -> Result<Self, MemoryError> {
        let mut block = Self::new(label, limit);
        block.replace(value)?;
        Ok(block)
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.value.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Replace the whole block. Returns the new length.
    pub fn replace(&mut self, new_value: impl Into<String>) -> Result<usize, MemoryError> {
        let new_value = new_value.into();
        let len = self.check_fits(&new_value)?;
        self.value = new_value;
        Ok(len)
    }

    /// Append `text` on a new line. Returns the new length.
    pub fn append(&mut self, text: &str) -> Result<usize, MemoryError> {
        let combined = if self.value.is_empty() {
            text.to_string()
        } else {
            format!("{}\n{}", self.value, text)
        };
        self.replace(combined)
    }

    /// Replace every occurrence of `old` with `new`. Returns the new length.
    pub fn replace_span(&mut self, old: &str, new: &str) -> Result<usize, MemoryError> {
        if old.is_empty() || !self.value.contains(old) {
            return Err(MemoryError::SpanNotFound {
                label: self.label.clone(),
                needle: old.to_string(),
            });
        }
        let replaced = self.value.replace(old, new);
        self.replace(replaced)
    }

    fn check_fits(&self, candidate: &str) -> Result<usize, MemoryError> {
        let attempted = candidate.chars().count();
        if attempted > self.limit {
            return Err(MemoryError::Overflow {
                label: self.label.clone(),
                attempted,
                limit: self.limit,
            });
        }
        Ok(attempted)
    }
}

/// Renders `<label characters="len/limit">value</label>`.
///
/// The alternate form (`{:#}`) leaves out the character count.
impl std::fmt::Display for MemoryBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if f.alternate() {
            write!(f, "<{0}>{1}</{0}>", self.label, self.value)
        } else {
            write!(
                f,
                "<{0} characters=\"{1}/{2}\">{3}</{0}>",
                self.label,
                self.len(),
                self.limit,
                self.value
            )
        }
    }
}

/// The agent's always-in-context memory: exactly a persona and a human block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreMemory {
    persona: MemoryBlock,
    human: MemoryBlock,
}

impl CoreMemory {
    /// Empty blocks with the given limits.
    pub fn new(persona_limit: usize, human_limit: usize) -> Self {
        Self {
            persona: MemoryBlock::new(PERSONA, persona_limit),
            human: MemoryBlock::new(HUMAN, human_limit),
        }
    }

    /// Both blocks filled; fails if either text is over its limit.
    pub fn with_values(
        persona: &str,
        human: &str,
        persona_limit: usize,
        human_limit: usize,
    ) -> Result<Self, MemoryError> {
        Ok(Self {
            persona: MemoryBlock::with_value(PERSONA, persona, persona_limit)?,
            human: MemoryBlock::with_value(HUMAN, human, human_limit)?,
        })
    }

    pub fn persona(&self) -> &MemoryBlock {
        &self.persona
    }

    pub fn human(&self) -> &MemoryBlock {
        &self.human
    }

    pub fn edit_persona(&mut self, text: impl Into<String>) -> Result<usize, MemoryError> {
        self.persona.replace(text)
    }

    pub fn edit_human(&mut self, text: impl Into<String>) -> Result<usize, MemoryError> {
        self.human.replace(text)
    }

    pub fn block(&self, label: &str) -> Option<&MemoryBlock> {
        match label {
            PERSONA => Some(&self.persona),
            HUMAN => Some(&self.human),
            _ => None,
        }
    }

    pub fn block_mut(&mut self, label: &str) -> Result<&mut MemoryBlock, MemoryError> {
        match label {
            PERSONA => Ok(&mut self.persona),
            HUMAN => Ok(&mut self.human),
            other => Err(MemoryError::UnknownBlock(other.to_string())),
        }
    }
}

impl Default for CoreMemory {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_LIMIT, DEFAULT_BLOCK_LIMIT)
    }
}

/// Both blocks, one per line. `{:#}` omits character counts.
impl std::fmt::Display for CoreMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if f.alternate() {
            write!(f, "{:#}\n{:#}", self.persona, self.human)
        } else {
            write!(f, "{}\n{}", self.persona, self.human)
        }
    }
}

/// A single archival memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub agent_id: Uuid,
    pub user_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Passage {
    pub fn new(agent_id: Uuid, user_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id,
            user_id,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

/// One page of query results plus the total number of matches.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }

    /// Slice `offset..offset+limit` out of a full result list.
    pub fn slice(all: Vec<T>, offset: usize, limit: usize) -> Self {
        let total = all.len();
        let items = all.into_iter().skip(offset).take(limit).collect();
        Self { items, total }
    }
}

/// Which recall messages a search should return.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageFilter {
    /// Case-insensitive substring match on content
    pub text: Option<String>,
    /// Inclusive lower bound on `created_at`
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`
    pub end: Option<DateTime<Utc>>,
    /// Allowed roles; empty means any
    pub roles: Vec<Role>,
}

impl MessageFilter {
    /// Conversation text search over user and assistant messages.
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            text: Some(query.into()),
            roles: vec![Role::User, Role::Assistant],
            ..Self::default()
        }
    }

    /// Date-bounded search over user and assistant messages.
    pub fn date_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            roles: vec![Role::User, Role::Assistant],
            ..Self::default()
        }
    }

    pub fn matches(&self, message: &Message) -> bool {
        if !self.roles.is_empty() && !self.roles.contains(&message.role) {
            return false;
        }
        if self.start.is_some_and(|start| message.created_at < start) {
            return false;
        }
        if self.end.is_some_and(|end| message.created_at > end) {
            return false;
        }
        match &self.text {
            Some(q) => message.content.to_lowercase().contains(&q.to_lowercase()),
            None => true,
        }
    }
}

/// Persistent store for an agent's full message history (recall memory).
///
/// `append_message` and `update_message` are idempotent: writing a message
/// that is already stored unchanged does nothing.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// The backend name (e.g., "memory", "file").
    fn name(&self) -> &str;

    async fn get_message(&self, id: &str) -> Result<Option<Message>, MemoryError>;

    async fn append_message(&self, message: &Message) -> Result<(), MemoryError>;

    async fn update_message(&self, message: &Message) -> Result<(), MemoryError>;

    /// Number of messages stored for `agent_id`.
    async fn count(&self, agent_id: Uuid) -> Result<usize, MemoryError>;

    /// Messages for `agent_id` matching `filter`, oldest first.
    async fn search(
        &self,
        agent_id: Uuid,
        filter: &MessageFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Message>, MemoryError>;

    async fn search_by_date(
        &self,
        agent_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Message>, MemoryError> {
        self.search(agent_id, &MessageFilter::date_range(start, end), offset, limit)
            .await
    }
}

/// Persistent store for archival passages.
#[async_trait]
pub trait ArchivalStore: Send + Sync {
    fn name(&self) -> &str;

    async fn insert(&self, passage: Passage) -> Result<(), MemoryError>;

    /// Passages for `agent_id` containing `query` (case-insensitive); an empty
    /// query matches everything.
    async fn search(
        &self,
        agent_id: Uuid,
        query: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<Passage>, MemoryError>;

    async fn count(&self, agent_id: Uuid) -> Result<usize, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_within_limit() {
        let mut block = MemoryBlock::new(PERSONA, 10);
        assert_eq!(block.replace("0123456789").unwrap(), 10);
        assert_eq!(block.value(), "0123456789");
    }

    #[test]
    fn replace_over_limit_leaves_block_unchanged() {
        let mut block = MemoryBlock::with_value(HUMAN, "Chad", 10).unwrap();
        let err = block.replace("01234567890").unwrap_err();
        assert!(matches!(
            err,
            MemoryError::Overflow { attempted: 11, limit: 10, .. }
        ));
        assert_eq!(block.value(), "Chad");
    }

    #[test]
    fn limit_counts_characters_not_bytes() {
        let mut block = MemoryBlock::new(PERSONA, 3);
        assert!(block.replace("äöü").is_ok());
        assert_eq!(block.len(), 3);
    }

    #[test]
    fn append_adds_newline_separator() {
        let mut block = MemoryBlock::with_value(HUMAN, "Name: Chad", 100).unwrap();
        block.append("Likes: hiking").unwrap();
        assert_eq!(block.value(), "Name: Chad\nLikes: hiking");

        let mut empty = MemoryBlock::new(HUMAN, 100);
        empty.append("first").unwrap();
        assert_eq!(empty.value(), "first");
    }

    #[test]
    fn append_overflow_fails() {
        let mut block = MemoryBlock::with_value(HUMAN, "12345", 8).unwrap();
        assert!(block.append("678").is_err());
        assert_eq!(block.value(), "12345");
    }

    #[test]
    fn replace_span_edits_substring() {
        let mut block = MemoryBlock::with_value(HUMAN, "Name: Chad", 100).unwrap();
        block.replace_span("Chad", "Brad").unwrap();
        assert_eq!(block.value(), "Name: Brad");
    }

    #[test]
    fn replace_span_missing_needle() {
        let mut block = MemoryBlock::with_value(HUMAN, "Name: Chad", 100).unwrap();
        let err = block.replace_span("Bob", "Brad").unwrap_err();
        assert!(matches!(err, MemoryError::SpanNotFound { .. }));
    }

    #[test]
    fn block_renders_with_character_count() {
        let mut core = CoreMemory::default();
        core.edit_persona("You are Sam.").unwrap();
        assert_eq!(
            core.persona().to_string(),
            "<persona characters=\"12/2000\">You are Sam.</persona>"
        );
        assert_eq!(format!("{:#}", core.persona()), "<persona>You are Sam.</persona>");
    }

    #[test]
    fn core_memory_lookup_by_label() {
        let mut core = CoreMemory::default();
        assert!(core.block(PERSONA).is_some());
        assert!(core.block("scratchpad").is_none());
        assert!(matches!(
            core.block_mut("scratchpad"),
            Err(MemoryError::UnknownBlock(_))
        ));
        core.block_mut(HUMAN).unwrap().append("Name: Chad").unwrap();
        assert_eq!(core.human().value(), "Name: Chad");
    }

    #[test]
    fn core_memory_rejects_oversized_initial_text() {
        let err = CoreMemory::with_values("abcdef", "ok", 5, 5).unwrap_err();
        assert!(matches!(err, MemoryError::Overflow { .. }));
    }

    #[test]
    fn filter_matches_text_case_insensitively() {
        let filter = MessageFilter::text("PIZZA");
        assert!(filter.matches(&Message::user("I love pizza")));
        assert!(!filter.matches(&Message::user("I love pasta")));
        assert!(!filter.matches(&Message::system("pizza rules")));
    }

    #[test]
    fn page_slices_results() {
        let page = Page::slice((0..12).collect::<Vec<_>>(), 5, 5);
        assert_eq!(page.items, vec![5, 6, 7, 8, 9]);
        assert_eq!(page.total, 12);
    }
}
