//! # memloop Core
//!
//! Domain types, collaborator traits, and error definitions for the memloop
//! agent runtime. This crate has **no framework dependencies**: it defines the
//! model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here: the model transport
//! ([`Provider`]), the stores ([`MessageStore`], [`ArchivalStore`],
//! [`AgentStore`]) and presentation ([`AgentInterface`]). Implementations live
//! in their own crates, which keeps the agent core testable with scripted
//! fakes.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod memory;
pub mod agent;
pub mod interface;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{FunctionCallMode, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use tool::ToolCall;
pub use memory::{ArchivalStore, CoreMemory, MemoryBlock, MessageFilter, MessageStore, Page, Passage};
pub use agent::{AgentState, AgentStore, EmbeddingConfig, LlmConfig, StateBag};
pub use interface::{AgentInterface, ChunkConsumer, Presentation};
