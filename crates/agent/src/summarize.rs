//! Choosing what to evict from the context, and condensing it.

use memloop_core::message::{Message, Role};

/// How evicted messages are condensed into the summary note.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Condensation {
    /// Ask the model to write the summary
    #[default]
    Model,
    /// Quote the start of the evicted conversation, no model call
    Excerpt,
}

/// What a summarization pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryReport {
    pub evicted: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub summary: String,
}

/// Upper bound on the summary the model is asked to write.
pub const SUMMARY_MAX_TOKENS: u32 = 300;

/// Longest excerpt used by [`Condensation::Excerpt`], in characters.
pub const EXCERPT_CHARS: usize = 600;

pub const SUMMARY_SYSTEM_PROMPT: &str = "\
Your job is to summarize a history of previous messages in a conversation between an AI persona and a human.
The conversation you are given is a from a fixed context window and may not be complete.
Messages sent by the AI are marked with the 'assistant' role.
The AI 'assistant' can also make calls to functions, whose outputs can be seen in messages with the 'tool' role.
Things the AI says in the message content are considered inner monologue and are not seen by the user.
The only AI messages seen by the user are from when the AI uses 'send_message'.
Messages the user sends are in the 'user' role.
The 'user' role is also used for important system events, such as login events and heartbeat events (heartbeats run the AI's program without user action, allowing the AI to act without prompting from the user sending them a message).
Summarize what happened in the conversation from the perspective of the AI (use the first person).
Keep your summary less than 100 words, do NOT exceed this word limit.
Only output the summary, do NOT include anything else in your output.";

/// Indices `k` where `messages[1..k]` can be evicted without splitting a
/// function call from its results or touching the most recent exchange.
///
/// Index 0 is the system message and is never part of an eviction.
pub fn eviction_boundaries(messages: &[Message]) -> Vec<usize> {
    if messages.len() < 2 {
        return Vec::new();
    }
    let keep_from = messages
        .iter()
        .rposition(|m| m.role == Role::User)
        .filter(|&i| i > 0)
        .unwrap_or(messages.len() - 1);

    (2..=keep_from)
        .filter(|&k| messages[k].role != Role::Tool)
        .collect()
}

/// `role: content` lines for the model to summarize.
pub fn transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let calls: Vec<String> = m
                .tool_calls
                .iter()
                .map(|c| format!(" [{}({})]", c.name, c.arguments))
                .collect();
            format!("{}: {}{}", m.role, m.content, calls.concat())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The opening of the evicted conversation, capped at [`EXCERPT_CHARS`].
pub fn excerpt(messages: &[Message]) -> String {
    let text = messages
        .iter()
        .filter(|m| matches!(m.role, Role::User | Role::Assistant) && !m.content.is_empty())
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");
    truncate_chars(&text, EXCERPT_CHARS)
}

/// Cut `text` to at most `max` characters, marking the cut with `…`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use memloop_core::message::MessageToolCall;

    fn convo() -> Vec<Message> {
        let call = MessageToolCall::new("send_message", r#"{"message":"hi"}"#);
        vec![
            Message::system("sys"),                                    // 0
            Message::user("hello"),                                    // 1
            Message::assistant("thinking").with_tool_calls(vec![call.clone()]), // 2
            Message::tool_result(call.id.clone(), "send_message", "ok"), // 3
            Message::user("how are you"),                              // 4
            Message::assistant("fine"),                                // 5
        ]
    }

    #[test]
    fn boundaries_skip_tool_results_and_latest_exchange() {
        // 3 is a tool result; 5 is after the last user message
        assert_eq!(eviction_boundaries(&convo()), vec![2, 4]);
    }

    #[test]
    fn no_boundaries_for_tiny_context() {
        assert!(eviction_boundaries(&[Message::system("s")]).is_empty());
        assert!(eviction_boundaries(&[Message::system("s"), Message::user("u")]).is_empty());
    }

    #[test]
    fn transcript_includes_calls() {
        let t = transcript(&convo()[1..4]);
        assert!(t.starts_with("user: hello\n"));
        assert!(t.contains("send_message("));
    }

    #[test]
    fn excerpt_is_capped() {
        let long = vec![Message::user("x".repeat(5000))];
        let e = excerpt(&long);
        assert_eq!(e.chars().count(), EXCERPT_CHARS);
        assert!(e.ends_with('…'));
    }
}
