//! Searching the full conversation history (recall memory).
//!
//! Results are paged [`DEFAULT_PAGE_SIZE`] at a time, pages are 0-based, and
//! the reply is a one-line header followed by a JSON list of strings.

use crate::catalog::{with_heartbeat, Function};
use crate::context::FunctionContext;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use memloop_core::error::ToolError;
use memloop_core::memory::{MessageFilter, Page};
use memloop_core::message::{format_timestamp, Message};
use memloop_core::tool::ToolCall;
use memloop_memory::DEFAULT_PAGE_SIZE;
use serde_json::json;

pub(crate) const NO_RESULTS: &str = "No results found.";

pub(crate) fn page_param() -> serde_json::Value {
    json!({
        "type": "integer",
        "description": "Allows you to page through results. Only use on a follow-up query. Defaults to 0 (first page)."
    })
}

/// The optional `page` argument. Missing, null and "none" all mean page 0.
pub(crate) fn page_arg(call: &ToolCall) -> Result<usize, ToolError> {
    let page = match call.arguments.get("page") {
        Some(serde_json::Value::String(s)) if s.trim().eq_ignore_ascii_case("none") => 0,
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().map_err(|_| {
            ToolError::InvalidArguments(format!("{}: 'page' must be an integer", call.name))
        })?,
        _ => call.int_arg("page")?.unwrap_or(0),
    };
    usize::try_from(page)
        .map_err(|_| ToolError::InvalidArguments(format!("{}: 'page' must not be negative", call.name)))
}

/// Render a page of results, or [`NO_RESULTS`] if the page is empty.
pub(crate) fn render_page<T>(page: &Page<T>, number: usize, line: impl Fn(&T) -> String) -> String {
    if page.items.is_empty() {
        return NO_RESULTS.to_string();
    }
    let num_pages = page.total.div_ceil(DEFAULT_PAGE_SIZE).saturating_sub(1);
    let lines: Vec<String> = page.items.iter().map(line).collect();
    format!(
        "Showing {} of {} results (page {}/{}): {}",
        page.items.len(),
        page.total,
        number,
        num_pages,
        serde_json::Value::from(lines)
    )
}

fn message_line(message: &Message) -> String {
    format!(
        "timestamp: {}, {} - {}",
        format_timestamp(&message.created_at),
        message.role,
        message.content
    )
}

fn date_arg(call: &ToolCall, key: &str) -> Result<NaiveDate, ToolError> {
    let raw = call.str_arg(key)?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| {
        ToolError::InvalidArguments(format!("{}: '{key}' must be YYYY-MM-DD ({e})", call.name))
    })
}

/// Text search over past user and assistant messages.
pub struct ConversationSearch;

#[async_trait]
impl Function for ConversationSearch {
    fn name(&self) -> &str {
        "conversation_search"
    }

    fn schema(&self) -> serde_json::Value {
        with_heartbeat(json!({
            "name": "conversation_search",
            "description": "Search prior conversation history using case-insensitive string matching.",
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
        let results = ctx
            .recall
            .query(&MessageFilter::text(query), page, DEFAULT_PAGE_SIZE)
            .await?;
        Ok(Some(render_page(&results, page, message_line)))
    }
}

/// Date-range search over past user and assistant messages.
pub struct ConversationSearchDate;

#[async_trait]
impl Function for ConversationSearchDate {
    fn name(&self) -> &str {
        "conversation_search_date"
    }

    fn schema(&self) -> serde_json::Value {
        with_heartbeat(json!({
            "name": "conversation_search_date",
            "description": "Search prior conversation history using a date range.",
            "parameters": {
                "type": "object",
                "properties": {
                    "start_date": {
                        "type": "string",
                        "description": "The start of the date range to search, in the format 'YYYY-MM-DD'."
                    },
                    "end_date": {
                        "type": "string",
                        "description": "The end of the date range to search, in the format 'YYYY-MM-DD'."
                    },
                    "page": page_param()
                },
                "required": ["start_date", "end_date"]
            }
        }))
    }

    async fn call(
        &self,
        ctx: &mut FunctionContext<'_>,
        call: &ToolCall,
    ) -> Result<Option<String>, ToolError> {
        let start = date_arg(call, "start_date")?;
        let end = date_arg(call, "end_date")?;
        let page = page_arg(call)?;

        // The end date covers the whole day.
        let start: DateTime<Utc> = start.and_time(NaiveTime::MIN).and_utc();
        let end: DateTime<Utc> = end
            .and_hms_milli_opt(23, 59, 59, 999)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| ToolError::InvalidArguments(format!("{}: bad end_date", call.name)))?;

        let results = ctx.recall.date_query(start, end, page, DEFAULT_PAGE_SIZE).await?;
        Ok(Some(render_page(&results, page, message_line)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use chrono::TimeZone;

    async fn seed(fx: &Fixture, texts: &[&str]) {
        let messages: Vec<Message> = texts
            .iter()
            .map(|t| Message::user(*t).owned_by(fx.agent_id, fx.user_id, None))
            .collect();
        fx.recall.append_all(&messages).await.unwrap();
    }

    #[tokio::test]
    async fn empty_history_has_no_results() {
        let mut fx = Fixture::new().await;
        let call = fx.call("conversation_search", json!({"query": "pizza"}));
        let out = ConversationSearch.call(&mut fx.ctx(), &call).await.unwrap();
        assert_eq!(out.as_deref(), Some(NO_RESULTS));
    }

    #[tokio::test]
    async fn search_formats_header_and_entries() {
        let mut fx = Fixture::new().await;
        seed(&fx, &["I love pizza", "what about sushi", "Pizza again"]).await;

        let call = fx.call("conversation_search", json!({"query": "pizza"}));
        let out = ConversationSearch.call(&mut fx.ctx(), &call).await.unwrap().unwrap();
        assert!(out.starts_with("Showing 2 of 2 results (page 0/0): ["), "{out}");
        assert!(out.contains("user - I love pizza"));
        assert!(out.contains("user - Pizza again"));
        assert!(!out.contains("sushi"));
    }

    #[tokio::test]
    async fn search_pages_through_results() {
        let mut fx = Fixture::new().await;
        let texts: Vec<String> = (0..7).map(|i| format!("note {i}")).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        seed(&fx, &refs).await;

        let call = fx.call("conversation_search", json!({"query": "note", "page": 1}));
        let out = ConversationSearch.call(&mut fx.ctx(), &call).await.unwrap().unwrap();
        assert!(out.starts_with("Showing 2 of 7 results (page 1/1):"), "{out}");
        assert!(out.contains("note 5"));

        let call = fx.call("conversation_search", json!({"query": "note", "page": 9}));
        let out = ConversationSearch.call(&mut fx.ctx(), &call).await.unwrap();
        assert_eq!(out.as_deref(), Some(NO_RESULTS));
    }

    #[tokio::test]
    async fn unreachable_page_has_no_results() {
        let mut fx = Fixture::new().await;
        seed(&fx, &["pizza"]).await;

        let call = fx.call("conversation_search", json!({"query": "pizza", "page": i64::MAX}));
        let out = ConversationSearch.call(&mut fx.ctx(), &call).await.unwrap();
        assert_eq!(out.as_deref(), Some(NO_RESULTS));

        let call = fx.call(
            "conversation_search_date",
            json!({"start_date": "2000-01-01", "end_date": "2999-12-31", "page": i64::MAX}),
        );
        let out = ConversationSearchDate.call(&mut fx.ctx(), &call).await.unwrap();
        assert_eq!(out.as_deref(), Some(NO_RESULTS));
    }

    #[tokio::test]
    async fn page_argument_variants() {
        let fx = Fixture::new().await;
        assert_eq!(page_arg(&fx.call("x", json!({}))).unwrap(), 0);
        assert_eq!(page_arg(&fx.call("x", json!({"page": null}))).unwrap(), 0);
        assert_eq!(page_arg(&fx.call("x", json!({"page": "None"}))).unwrap(), 0);
        assert_eq!(page_arg(&fx.call("x", json!({"page": "2"}))).unwrap(), 2);
        assert!(page_arg(&fx.call("x", json!({"page": -1}))).is_err());
    }

    #[tokio::test]
    async fn date_search_includes_whole_end_day() {
        let mut fx = Fixture::new().await;
        let mut early = Message::user("breakfast").owned_by(fx.agent_id, fx.user_id, None);
        early.created_at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let mut late = Message::user("midnight snack").owned_by(fx.agent_id, fx.user_id, None);
        late.created_at = Utc.with_ymd_and_hms(2024, 3, 2, 23, 59, 30).unwrap();
        let mut outside = Message::user("next day").owned_by(fx.agent_id, fx.user_id, None);
        outside.created_at = Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 1).unwrap();
        fx.recall.append_all(&[early, late, outside]).await.unwrap();

        let call = fx.call(
            "conversation_search_date",
            json!({"start_date": "2024-03-01", "end_date": "2024-03-02"}),
        );
        let out = ConversationSearchDate.call(&mut fx.ctx(), &call).await.unwrap().unwrap();
        assert!(out.starts_with("Showing 2 of 2 results"), "{out}");
        assert!(out.contains("2024-03-01 08:00:00 AM"));
        assert!(!out.contains("next day"));
    }

    #[tokio::test]
    async fn bad_date_is_rejected() {
        let mut fx = Fixture::new().await;
        let call = fx.call(
            "conversation_search_date",
            json!({"start_date": "March 1", "end_date": "2024-03-02"}),
        );
        let err = ConversationSearchDate.call(&mut fx.ctx(), &call).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
