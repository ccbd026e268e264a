//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. Good enough to
//! decide when the context is getting full; exact counts come from the
//! provider's `Usage` when it reports one.

use memloop_core::message::Message;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for a single message including per-message overhead.
///
/// Each message costs ~4 tokens for role and delimiters; function calls are
/// charged for their name and JSON arguments.
pub fn estimate_message_tokens(message: &Message) -> usize {
    let overhead = 4;
    let calls: usize = message
        .tool_calls
        .iter()
        .map(|c| estimate_tokens(&c.name) + estimate_tokens(&c.arguments))
        .sum();
    overhead + estimate_tokens(&message.content) + calls
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Estimate tokens for function schemas (serialized as JSON).
pub fn estimate_schema_tokens(schemas: &[serde_json::Value]) -> usize {
    schemas
        .iter()
        .map(|s| estimate_tokens(&s.to_string()))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use memloop_core::message::MessageToolCall;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn message_includes_overhead() {
        let msg = Message::user("test"); // 1 token + 4 overhead
        assert_eq!(estimate_message_tokens(&msg), 5);
    }

    #[test]
    fn tool_calls_are_counted() {
        let plain = Message::assistant("thinking");
        let with_call = Message::assistant("thinking")
            .with_tool_calls(vec![MessageToolCall::new("send_message", r#"{"message":"hi"}"#)]);
        assert!(estimate_message_tokens(&with_call) > estimate_message_tokens(&plain));
    }

    #[test]
    fn multiple_messages() {
        let msgs = vec![Message::user("hello"), Message::assistant("world")];
        assert_eq!(estimate_messages_tokens(&msgs), 12);
    }

    #[test]
    fn empty_schemas_is_zero() {
        assert_eq!(estimate_schema_tokens(&[]), 0);
        assert!(estimate_schema_tokens(&[serde_json::json!({"name": "x"})]) > 0);
    }
}
