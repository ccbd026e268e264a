//! Message domain types.
//!
//! A message is created by the agent engine or the sequence builder,
//! persisted to the recall store, and referenced by id from the agent's
//! in-context list.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user, or a synthetic system event delivered in the user slot
    User,
    /// The model (inner monologue + function calls)
    Assistant,
    /// System instructions with rendered core memory
    System,
    /// Function execution result
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// A single message in an agent's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content (inner monologue for assistant messages)
    #[serde(default)]
    pub content: String,

    /// Function calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a function result, which call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Function name, set on tool results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Creation time, always UTC once loaded
    #[serde(deserialize_with = "deserialize_lenient_utc")]
    pub created_at: DateTime<Utc>,

    /// Owning agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<Uuid>,

    /// Owning user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,

    /// Model that produced (or will consume) this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Pinned messages are never evicted by summarization
    #[serde(default)]
    pub pinned: bool,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            created_at: Utc::now(),
            agent_id: None,
            user_id: None,
            model: None,
            pinned: false,
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// Create a new system message. System messages are pinned.
    pub fn system(content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(Role::System, content.into());
        msg.pinned = true;
        msg
    }

    /// Create a function result message.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::with_role(Role::Tool, content.into());
        msg.tool_call_id = Some(tool_call_id.into());
        msg.name = Some(name.into());
        msg
    }

    /// Attach function calls to an assistant message.
    pub fn with_tool_calls(mut self, tool_calls: Vec<MessageToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Stamp ownership and model onto the message.
    pub fn owned_by(mut self, agent_id: Uuid, user_id: Uuid, model: Option<&str>) -> Self {
        self.agent_id = Some(agent_id);
        self.user_id = Some(user_id);
        self.model = model.map(str::to_string);
        self
    }
}

/// A function call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this call
    pub id: String,

    /// Name of the function to invoke
    pub name: String,

    /// Arguments as a JSON string
    pub arguments: String,
}

impl MessageToolCall {
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Parse a persisted timestamp, repairing anything that isn't UTC.
///
/// Offset timestamps are converted to UTC; naive timestamps are taken as UTC.
/// Returns the timestamp and whether a repair was needed.
pub fn normalize_timestamp(raw: &str) -> Result<(DateTime<Utc>, bool), chrono::ParseError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        let repaired = ts.offset().local_minus_utc() != 0;
        return Ok((ts.with_timezone(&Utc), repaired));
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))?;
    Ok((naive.and_utc(), true))
}

/// Human-readable time used in prompts and function results,
/// e.g. `2024-03-01 02:05:09 PM UTC+0000`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %I:%M:%S %p UTC%z").to_string()
}

fn deserialize_lenient_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let (ts, repaired) = normalize_timestamp(&raw).map_err(serde::de::Error::custom)?;
    if repaired {
        warn!(timestamp = %raw, normalized = %ts, "Message created_at isn't UTC, normalizing");
    }
    Ok(ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
        assert!(msg.tool_calls.is_empty());
        assert!(!msg.pinned);
    }

    #[test]
    fn system_messages_are_pinned() {
        assert!(Message::system("rules").pinned);
    }

    #[test]
    fn tool_result_carries_call_id_and_name() {
        let msg = Message::tool_result("call_1", "send_message", "{}");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.name.as_deref(), Some("send_message"));
    }

    #[test]
    fn message_serialization_roundtrip() {
        let agent = Uuid::new_v4();
        let user = Uuid::new_v4();
        let msg = Message::assistant("thinking")
            .with_tool_calls(vec![MessageToolCall::new("send_message", "{}")])
            .owned_by(agent, user, Some("gpt-4o"));
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn utc_timestamp_needs_no_repair() {
        let (ts, repaired) = normalize_timestamp("2024-03-01T12:00:00Z").unwrap();
        assert!(!repaired);
        assert_eq!(ts.to_rfc3339(), "2024-03-01T12:00:00+00:00");
    }

    #[test]
    fn offset_timestamp_is_converted_to_utc() {
        let (ts, repaired) = normalize_timestamp("2024-03-01T14:00:00+02:00").unwrap();
        assert!(repaired);
        assert_eq!(ts.to_rfc3339(), "2024-03-01T12:00:00+00:00");
    }

    #[test]
    fn naive_timestamp_is_taken_as_utc() {
        let (ts, repaired) = normalize_timestamp("2024-03-01 12:00:00.250").unwrap();
        assert!(repaired);
        assert_eq!(ts.timestamp_millis() % 1000, 250);

        let (ts, _) = normalize_timestamp("2024-03-01T12:00:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T12:00:00+00:00");
    }

    #[test]
    fn prompt_timestamp_format() {
        let (ts, _) = normalize_timestamp("2024-03-01T14:05:09Z").unwrap();
        assert_eq!(format_timestamp(&ts), "2024-03-01 02:05:09 PM UTC+0000");
    }

    #[test]
    fn legacy_record_loads_with_repaired_timestamp() {
        let json = r#"{
            "id": "m1",
            "role": "user",
            "content": "hi",
            "created_at": "2023-11-05T09:30:00-05:00"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.created_at.to_rfc3339(), "2023-11-05T14:30:00+00:00");
    }

    #[test]
    fn garbage_timestamp_is_rejected() {
        let json = r#"{"id":"m1","role":"user","content":"hi","created_at":"yesterday"}"#;
        assert!(serde_json::from_str::<Message>(json).is_err());
    }
}
