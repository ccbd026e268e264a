//! Archival memory: unbounded long-term storage outside the context window.

use crate::catalog::{with_heartbeat, Function};
use crate::context::FunctionContext;
use crate::recall_search::{page_arg, page_param, render_page};
use async_trait::async_trait;
use memloop_core::error::ToolError;
use memloop_core::memory::Passage;
use memloop_core::message::format_timestamp;
use memloop_core::tool::ToolCall;
use memloop_memory::DEFAULT_PAGE_SIZE;
use serde_json::json;

/// Writes a passage to archival memory. Takes effect immediately.
pub struct ArchivalMemoryInsert;

#[async_trait]
impl Function for ArchivalMemoryInsert {
    fn name(&self) -> &str {
        "archival_memory_insert"
    }

    fn schema(&self) -> serde_json::Value {
        with_heartbeat(json!({
            "name": "archival_memory_insert",
            "description": "Add to archival memory. Make sure to phrase the memory contents such that it can be easily queried later.",
            "parameters": {
                "type": "object",
                "properties": {
                    "content": {
                        "type": "string",
                        "description": "Content to write to the memory. All unicode (including emojis) are supported."
                    }
                },
                "required": ["content"]
            }
        }))
    }

    async fn call(
        &self,
        ctx: &mut FunctionContext<'_>,
        call: &ToolCall,
    ) -> Result<Option<String>, ToolError> {
        let content = call.str_arg("content")?;
        ctx.archival.insert(content).await?;
        Ok(None)
    }
}

/// Searches archival memory.
pub struct ArchivalMemorySearch;

fn passage_line(passage: &Passage) -> String {
    format!(
        "timestamp: {}, memory: {}",
        format_timestamp(&passage.created_at),
        passage.text
    )
}

#[async_trait]
impl Function for ArchivalMemorySearch {
    fn name(&self) -> &str {
        "archival_memory_search"
    }

    fn schema(&self) -> serde_json::Value {
        with_heartbeat(json!({
            "name": "archival_memory_search",
            "description": "Search archival memory using semantic (embedding-based) search.",
            "parameters": {
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "String to search for."
                    },
                    "page": page_param()
                },
                "required": ["query"]
            }
        }))
    }

    async fn call(
        &self,
        ctx: &mut FunctionContext<'_>,
        call: &ToolCall,
    ) -> Result<Option<String>, ToolError> {
        let query = call.str_arg("query")?;
        let page = page_arg(call)?;
        let results = ctx.archival.query(query, page, DEFAULT_PAGE_SIZE).await?;
        Ok(Some(render_page(&results, page, passage_line)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recall_search::NO_RESULTS;
    use crate::testing::Fixture;

    #[tokio::test]
    async fn insert_then_search() {
        let mut fx = Fixture::new().await;
        let call = fx.call("archival_memory_insert", json!({"content": "User's dog is called Biscuit"}));
        assert_eq!(ArchivalMemoryInsert.call(&mut fx.ctx(), &call).await.unwrap(), None);
        assert_eq!(fx.archival.count(), 1);

        let call = fx.call("archival_memory_search", json!({"query": "biscuit"}));
        let out = ArchivalMemorySearch.call(&mut fx.ctx(), &call).await.unwrap().unwrap();
        assert!(out.starts_with("Showing 1 of 1 results (page 0/0): ["), "{out}");
        assert!(out.contains("memory: User's dog is called Biscuit"));
    }

    #[tokio::test]
    async fn search_with_no_match() {
        let mut fx = Fixture::new().await;
        fx.archival.insert("unrelated").await.unwrap();
        let call = fx.call("archival_memory_search", json!({"query": "biscuit"}));
        let out = ArchivalMemorySearch.call(&mut fx.ctx(), &call).await.unwrap();
        assert_eq!(out.as_deref(), Some(NO_RESULTS));
    }

    #[tokio::test]
    async fn unreachable_page_has_no_results() {
        let mut fx = Fixture::new().await;
        fx.archival.insert("fact").await.unwrap();
        let call = fx.call("archival_memory_search", json!({"query": "fact", "page": i64::MAX}));
        let out = ArchivalMemorySearch.call(&mut fx.ctx(), &call).await.unwrap();
        assert_eq!(out.as_deref(), Some(NO_RESULTS));
    }

    #[tokio::test]
    async fn search_second_page() {
        let mut fx = Fixture::new().await;
        for i in 0..11 {
            fx.archival.insert(&format!("fact {i}")).await.unwrap();
        }
        let call = fx.call("archival_memory_search", json!({"query": "fact", "page": 2}));
        let out = ArchivalMemorySearch.call(&mut fx.ctx(), &call).await.unwrap().unwrap();
        assert!(out.starts_with("Showing 1 of 11 results (page 2/2):"), "{out}");
        assert!(out.contains("fact 10"));
    }
}
