//! Memory tiers and store implementations for memloop.

pub mod file_backend;
pub mod in_memory;
pub mod tiers;

pub use file_backend::FileStore;
pub use in_memory::InMemoryStore;
pub use tiers::{ArchivalMemory, RecallMemory, DEFAULT_PAGE_SIZE};
