//! The memloop agent engine.
//!
//! An agent runs in short bursts. Each burst is a **step**:
//!
//! 1. **Receive** an input (a user message or a system event)
//! 2. **Build context**: the re-rendered system prompt with core memory,
//!    the in-context messages and the pending input
//! 3. **Call the model** via the configured provider
//! 4. **Dispatch** the requested functions against staged memory
//! 5. **Commit** the new messages to recall and the context
//!
//! [`Agent::run`] keeps stepping while a function requests a heartbeat,
//! a call fails, or memory pressure needs the model's attention, up to a
//! bounded chain.

pub mod agent;
pub mod builder;
pub mod preset;
pub mod registry;
pub mod summarize;
pub mod system;
pub mod token;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agent::{Agent, AgentDeps, AgentSettings, RunOutcome, StepInput, StepOptions, StepOutcome};
pub use builder::{render_system_with_memory, MessageSequenceBuilder};
pub use preset::{Preset, DEFAULT_HUMAN, DEFAULT_PERSONA, DEFAULT_PRESET};
pub use registry::{FunctionBinding, FunctionRegistry, SchemaDrift};
pub use summarize::{Condensation, SummaryReport};
