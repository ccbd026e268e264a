//! Built-in agent functions for memloop.
//!
//! Functions are the agent's only way to act: speaking to the user,
//! editing its own core memory and searching the memory tiers that live
//! outside the context window.

pub mod archival;
pub mod catalog;
pub mod context;
pub mod core_memory;
pub mod messaging;
pub mod recall_search;

pub use catalog::{with_heartbeat, Function, FunctionCatalog};
pub use context::{FunctionContext, HeartbeatState, MAX_PAUSE_HEARTBEATS};

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use chrono::{DateTime, Utc};
    use memloop_core::interface::RecordingInterface;
    use memloop_core::memory::CoreMemory;
    use memloop_core::message::MessageToolCall;
    use memloop_core::tool::ToolCall;
    use memloop_memory::{ArchivalMemory, InMemoryStore, RecallMemory};
    use std::sync::Arc;
    use uuid::Uuid;

    /// Owns everything a [`FunctionContext`] borrows.
    pub struct Fixture {
        pub agent_id: Uuid,
        pub user_id: Uuid,
        pub memory: CoreMemory,
        pub heartbeat: HeartbeatState,
        pub archival: ArchivalMemory,
        pub recall: RecallMemory,
        pub interface: RecordingInterface,
        pub now: DateTime<Utc>,
    }

    impl Fixture {
        pub async fn new() -> Self {
            Self::with_limits(2000, 2000).await
        }

        pub async fn with_limits(persona: usize, human: usize) -> Self {
            let store = Arc::new(InMemoryStore::new());
            let agent_id = Uuid::new_v4();
            let user_id = Uuid::new_v4();
            Self {
                agent_id,
                user_id,
                memory: CoreMemory::new(persona, human),
                heartbeat: HeartbeatState::default(),
                archival: ArchivalMemory::open(store.clone(), agent_id, user_id).await,
                recall: RecallMemory::open(store, agent_id).await,
                interface: RecordingInterface::new(),
                now: Utc::now(),
            }
        }

        pub fn ctx(&mut self) -> FunctionContext<'_> {
            FunctionContext {
                agent_id: self.agent_id,
                user_id: self.user_id,
                memory: &mut self.memory,
                heartbeat: &mut self.heartbeat,
                archival: &self.archival,
                recall: &self.recall,
                interface: &self.interface,
                now: self.now,
            }
        }

        pub fn call(&self, name: &str, args: serde_json::Value) -> ToolCall {
            let raw = MessageToolCall::new(name, args.to_string());
            let mut call = ToolCall::parse(&raw).expect("valid test call");
            call.take_heartbeat_request();
            call
        }
    }
}
