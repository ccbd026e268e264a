//! Presentation seam: how an agent reports what it is doing.
//!
//! The engine reports every user message, inner monologue, `send_message`
//! output and function call to an [`AgentInterface`]. Whether model output is
//! also forwarded chunk by chunk is decided once, at construction, through
//! [`Presentation`].

use std::sync::{Arc, Mutex};

use crate::message::Message;
use crate::provider::StreamChunk;

/// Observer for agent events.
pub trait AgentInterface: Send + Sync {
    /// The agent received a user message (or a system event in the user slot).
    fn user_message(&self, text: &str, message: Option<&Message>);

    /// The model produced inner monologue.
    fn internal_monologue(&self, text: &str, message: Option<&Message>);

    /// The agent spoke to the user via `send_message`.
    fn assistant_message(&self, text: &str, message: Option<&Message>);

    /// A function was called, or returned.
    fn function_message(&self, text: &str, message: Option<&Message>);
}

/// Receives raw model output while a step is in flight.
pub trait ChunkConsumer: Send + Sync {
    fn stream_start(&self) {}

    fn process_chunk(&self, chunk: &StreamChunk);

    fn stream_end(&self) {}
}

/// How model output reaches the user.
#[derive(Clone, Default)]
pub enum Presentation {
    /// Wait for the whole response, then report it through the interface
    #[default]
    Full,
    /// Also stream every chunk to the consumer as it arrives
    Incremental(Arc<dyn ChunkConsumer>),
}

impl Presentation {
    pub fn is_incremental(&self) -> bool {
        matches!(self, Self::Incremental(_))
    }
}

impl std::fmt::Debug for Presentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => f.write_str("Full"),
            Self::Incremental(_) => f.write_str("Incremental(..)"),
        }
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentInterface;

impl AgentInterface for SilentInterface {
    fn user_message(&self, _text: &str, _message: Option<&Message>) {}
    fn internal_monologue(&self, _text: &str, _message: Option<&Message>) {}
    fn assistant_message(&self, _text: &str, _message: Option<&Message>) {}
    fn function_message(&self, _text: &str, _message: Option<&Message>) {}
}

/// Which interface callback produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    User,
    Monologue,
    Assistant,
    Function,
}

/// Records events in order. Useful for embedding and for tests.
#[derive(Debug, Default)]
pub struct RecordingInterface {
    events: Mutex<Vec<(EventKind, String)>>,
}

impl RecordingInterface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(EventKind, String)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Texts of all events of one kind.
    pub fn texts(&self, kind: EventKind) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, t)| t)
            .collect()
    }

    fn push(&self, kind: EventKind, text: &str) {
        if let Ok(mut events) = self.events.lock() {
            events.push((kind, text.to_string()));
        }
    }
}

impl AgentInterface for RecordingInterface {
    fn user_message(&self, text: &str, _message: Option<&Message>) {
        self.push(EventKind::User, text);
    }

    fn internal_monologue(&self, text: &str, _message: Option<&Message>) {
        self.push(EventKind::Monologue, text);
    }

    fn assistant_message(&self, text: &str, _message: Option<&Message>) {
        self.push(EventKind::Assistant, text);
    }

    fn function_message(&self, text: &str, _message: Option<&Message>) {
        self.push(EventKind::Function, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_interface_keeps_order() {
        let iface = RecordingInterface::new();
        iface.user_message("hi", None);
        iface.internal_monologue("thinking", None);
        iface.assistant_message("hello", None);
        assert_eq!(
            iface.events(),
            vec![
                (EventKind::User, "hi".to_string()),
                (EventKind::Monologue, "thinking".to_string()),
                (EventKind::Assistant, "hello".to_string()),
            ]
        );
        assert_eq!(iface.texts(EventKind::Assistant), vec!["hello".to_string()]);
    }

    #[test]
    fn presentation_defaults_to_full() {
        assert!(!Presentation::default().is_incremental());
    }
}
