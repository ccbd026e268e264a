//! What a function can see and touch while it runs.

use chrono::{DateTime, Duration, Utc};
use memloop_core::interface::AgentInterface;
use memloop_core::memory::CoreMemory;
use memloop_memory::{ArchivalMemory, RecallMemory};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on a heartbeat pause, in minutes.
pub const MAX_PAUSE_HEARTBEATS: u32 = 360;

/// Per-agent timed-heartbeat pause.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatState {
    pub pause_until: Option<DateTime<Utc>>,
    pub pause_minutes: u32,
}

impl HeartbeatState {
    /// Pause heartbeats for `minutes` (capped at [`MAX_PAUSE_HEARTBEATS`]).
    /// Returns the minutes actually applied.
    pub fn pause(&mut self, minutes: u32, now: DateTime<Utc>) -> u32 {
        let minutes = minutes.min(MAX_PAUSE_HEARTBEATS);
        self.pause_minutes = minutes;
        self.pause_until = Some(now + Duration::minutes(i64::from(minutes)));
        minutes
    }

    pub fn is_paused(&self, now: DateTime<Utc>) -> bool {
        self.pause_until.is_some_and(|until| now < until)
    }

    pub fn resume(&mut self) {
        self.pause_until = None;
        self.pause_minutes = 0;
    }
}

/// Execution context handed to every function call.
///
/// `memory` and `heartbeat` are the step's staged copies: the engine only
/// commits them once the whole batch of calls has been resolved.
pub struct FunctionContext<'a> {
    pub agent_id: Uuid,
    pub user_id: Uuid,
    pub memory: &'a mut CoreMemory,
    pub heartbeat: &'a mut HeartbeatState,
    pub archival: &'a ArchivalMemory,
    pub recall: &'a RecallMemory,
    pub interface: &'a dyn AgentInterface,
    pub now: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_is_capped() {
        let now = Utc::now();
        let mut hb = HeartbeatState::default();
        assert_eq!(hb.pause(1000, now), MAX_PAUSE_HEARTBEATS);
        assert!(hb.is_paused(now + Duration::minutes(359)));
        assert!(!hb.is_paused(now + Duration::minutes(360)));
    }

    #[test]
    fn resume_clears_pause() {
        let now = Utc::now();
        let mut hb = HeartbeatState::default();
        hb.pause(10, now);
        hb.resume();
        assert!(!hb.is_paused(now));
        assert_eq!(hb, HeartbeatState::default());
    }
}
