//! Editing the in-context persona and human blocks.

use crate::catalog::{with_heartbeat, Function};
use crate::context::FunctionContext;
use async_trait::async_trait;
use memloop_core::error::ToolError;
use memloop_core::tool::ToolCall;
use serde_json::json;
use tracing::debug;

fn section_param() -> serde_json::Value {
    json!({
        "type": "string",
        "description": "Section of the memory to be edited (persona or human)."
    })
}

/// Appends to a core memory block.
pub struct CoreMemoryAppend;

#[async_trait]
impl Function for CoreMemoryAppend {
    fn name(&self) -> &str {
        "core_memory_append"
    }

    fn schema(&self) -> serde_json::Value {
        with_heartbeat(json!({
            "name": "core_memory_append",
            "description": "Append to the contents of core memory.",
            "parameters": {
                "type": "object",
                "properties": {
                    "name": section_param(),
                    "content": {
                        "type": "string",
                        "description": "Content to write to the memory. All unicode (including emojis) are supported."
                    }
                },
                "required": ["name", "content"]
            }
        }))
    }

    async fn call(
        &self,
        ctx: &mut FunctionContext<'_>,
        call: &ToolCall,
    ) -> Result<Option<String>, ToolError> {
        let label = call.str_arg("name")?;
        let content = call.str_arg("content")?;
        let len = ctx.memory.block_mut(label)?.append(content)?;
        debug!(block = label, len, "Core memory appended");
        Ok(None)
    }
}

/// Replaces a span of a core memory block.
pub struct CoreMemoryReplace;

#[async_trait]
impl Function for CoreMemoryReplace {
    fn name(&self) -> &str {
        "core_memory_replace"
    }

    fn schema(&self) -> serde_json::Value {
        with_heartbeat(json!({
            "name": "core_memory_replace",
            "description": "Replace the contents of core memory. To delete memories, use an empty string for new_content.",
            "parameters": {
                "type": "object",
                "properties": {
                    "name": section_param(),
                    "old_content": {
                        "type": "string",
                        "description": "String to replace. Must be an exact match."
                    },
                    "new_content": {
                        "type": "string",
                        "description": "Content to write to the memory. All unicode (including emojis) are supported."
                    }
                },
                "required": ["name", "old_content", "new_content"]
            }
        }))
    }

    async fn call(
        &self,
        ctx: &mut FunctionContext<'_>,
        call: &ToolCall,
    ) -> Result<Option<String>, ToolError> {
        let label = call.str_arg("name")?;
        let old = call.str_arg("old_content")?;
        let new = call.str_arg("new_content")?;
        let len = ctx.memory.block_mut(label)?.replace_span(old, new)?;
        debug!(block = label, len, "Core memory span replaced");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use memloop_core::error::MemoryError;

    #[tokio::test]
    async fn append_adds_line() {
        let mut fx = Fixture::new().await;
        fx.memory.edit_human("First name: Chad").unwrap();
        let call = fx.call("core_memory_append", json!({"name": "human", "content": "Likes hiking"}));
        assert_eq!(CoreMemoryAppend.call(&mut fx.ctx(), &call).await.unwrap(), None);
        assert_eq!(fx.memory.human().value(), "First name: Chad\nLikes hiking");
    }

    #[tokio::test]
    async fn append_over_limit_leaves_block_alone() {
        let mut fx = Fixture::with_limits(10, 10).await;
        fx.memory.edit_persona("12345").unwrap();
        let call = fx.call("core_memory_append", json!({"name": "persona", "content": "abcdefgh"}));
        let err = CoreMemoryAppend.call(&mut fx.ctx(), &call).await.unwrap_err();
        assert!(matches!(err, ToolError::Memory(MemoryError::Overflow { .. })));
        assert_eq!(fx.memory.persona().value(), "12345");
    }

    #[tokio::test]
    async fn unknown_section_is_an_error() {
        let mut fx = Fixture::new().await;
        let call = fx.call("core_memory_append", json!({"name": "diary", "content": "x"}));
        let err = CoreMemoryAppend.call(&mut fx.ctx(), &call).await.unwrap_err();
        assert!(matches!(err, ToolError::Memory(MemoryError::UnknownBlock(_))));
    }

    #[tokio::test]
    async fn replace_span() {
        let mut fx = Fixture::new().await;
        fx.memory.edit_human("Name: Chad\nJob: unknown").unwrap();
        let call = fx.call(
            "core_memory_replace",
            json!({"name": "human", "old_content": "unknown", "new_content": "nurse"}),
        );
        CoreMemoryReplace.call(&mut fx.ctx(), &call).await.unwrap();
        assert_eq!(fx.memory.human().value(), "Name: Chad\nJob: nurse");
    }

    #[tokio::test]
    async fn replace_missing_span_fails() {
        let mut fx = Fixture::new().await;
        fx.memory.edit_human("Name: Chad").unwrap();
        let call = fx.call(
            "core_memory_replace",
            json!({"name": "human", "old_content": "Brad", "new_content": "x"}),
        );
        let err = CoreMemoryReplace.call(&mut fx.ctx(), &call).await.unwrap_err();
        assert!(matches!(err, ToolError::Memory(MemoryError::SpanNotFound { .. })));
        assert_eq!(fx.memory.human().value(), "Name: Chad");
    }
}
