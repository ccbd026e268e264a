//! Model gateway implementations for memloop.
//!
//! All providers implement the `memloop_core::Provider` trait.
//! [`RetryingProvider`] composes around any of them to absorb rate limits.

pub mod openai_compat;
pub mod retry;

pub use openai_compat::OpenAiCompatProvider;
pub use retry::{RetryPolicy, RetryingProvider};
