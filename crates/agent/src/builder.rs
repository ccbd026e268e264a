//! Builds the system message and the opening message sequence.

use crate::system::{
    login_event, package_function_response, INITIAL_BOOT_MESSAGE_SEND_MESSAGE_FIRST_MSG,
    INITIAL_BOOT_MESSAGE_SEND_MESSAGE_THOUGHT,
};
use chrono::{DateTime, Utc};
use memloop_core::memory::CoreMemory;
use memloop_core::message::{format_timestamp, Message, MessageToolCall};

/// The system prompt followed by the memory section.
///
/// Block spans come from `MemoryBlock`'s `Display`; `{:#}` drops the
/// character counts.
pub fn render_system_with_memory(
    system: &str,
    memory: &CoreMemory,
    edit_timestamp: &str,
    recall_count: usize,
    archival_count: usize,
    include_char_count: bool,
) -> String {
    let (persona, human) = if include_char_count {
        (memory.persona().to_string(), memory.human().to_string())
    } else {
        (format!("{:#}", memory.persona()), format!("{:#}", memory.human()))
    };
    [
        system.to_string(),
        "\n".to_string(),
        format!("{MEMORY_HEADER}{}]", edit_timestamp.trim()),
        format!(
            "{recall_count} previous messages between you and the user are stored in recall memory (use functions to access them)"
        ),
        format!(
            "{archival_count} total memories you created are stored in archival memory (use functions to access them)"
        ),
        "\nCore memory shown below (limited in size, additional information stored in archival / recall memory):".to_string(),
        persona,
        human,
    ]
    .join("\n")
}

/// The `last modified` stamp of a rendered system message.
pub fn parse_edit_timestamp(system: &str) -> Option<DateTime<Utc>> {
    let start = system.find(MEMORY_HEADER)? + MEMORY_HEADER.len();
    let end = start + system[start..].find(']')?;
    DateTime::parse_from_str(&system[start..end], "%Y-%m-%d %I:%M:%S %p UTC%z")
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

const MEMORY_HEADER: &str = "### Memory [last modified: ";

/// Assembles the message list a fresh agent starts with.
pub struct MessageSequenceBuilder<'a> {
    system: &'a str,
    memory: &'a CoreMemory,
    include_char_count: bool,
    boot_messages: bool,
}

impl<'a> MessageSequenceBuilder<'a> {
    pub fn new(system: &'a str, memory: &'a CoreMemory) -> Self {
        Self {
            system,
            memory,
            include_char_count: true,
            boot_messages: true,
        }
    }

    pub fn with_char_count(mut self, enabled: bool) -> Self {
        self.include_char_count = enabled;
        self
    }

    /// Include the scripted assistant greeting before the login event.
    pub fn with_boot_messages(mut self, enabled: bool) -> Self {
        self.boot_messages = enabled;
        self
    }

    pub fn render_system(
        &self,
        edit_timestamp: &DateTime<Utc>,
        recall_count: usize,
        archival_count: usize,
    ) -> String {
        render_system_with_memory(
            self.system,
            self.memory,
            &format_timestamp(edit_timestamp),
            recall_count,
            archival_count,
            self.include_char_count,
        )
    }

    /// `[system, assistant(+send_message), tool(OK), user(login)]`, or
    /// `[system, user(login)]` without boot messages.
    pub fn initial_sequence(
        &self,
        edit_timestamp: &DateTime<Utc>,
        recall_count: usize,
        archival_count: usize,
        now: DateTime<Utc>,
    ) -> Vec<Message> {
        let mut messages = vec![Message::system(self.render_system(
            edit_timestamp,
            recall_count,
            archival_count,
        ))];

        if self.boot_messages {
            let call = MessageToolCall::new(
                "send_message",
                format!("{{\n  \"message\": \"{INITIAL_BOOT_MESSAGE_SEND_MESSAGE_FIRST_MSG}\"\n}}"),
            );
            let result = Message::tool_result(
                call.id.clone(),
                "send_message",
                package_function_response(true, None, now),
            );
            messages.push(
                Message::assistant(INITIAL_BOOT_MESSAGE_SEND_MESSAGE_THOUGHT).with_tool_calls(vec![call]),
            );
            messages.push(result);
        }

        messages.push(Message::user(login_event(None, now)));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memloop_core::message::Role;

    fn memory() -> CoreMemory {
        let mut m = CoreMemory::new(2000, 2000);
        m.edit_persona("You are Sam.").unwrap();
        m.edit_human("First name: Chad").unwrap();
        m
    }

    #[test]
    fn system_prompt_layout() {
        let rendered = render_system_with_memory("SYS", &memory(), " 2024-01-01 ", 3, 7, true);
        let expected = [
            "SYS",
            "\n",
            "### Memory [last modified: 2024-01-01]",
            "3 previous messages between you and the user are stored in recall memory (use functions to access them)",
            "7 total memories you created are stored in archival memory (use functions to access them)",
            "\nCore memory shown below (limited in size, additional information stored in archival / recall memory):",
            "<persona characters=\"12/2000\">You are Sam.</persona>",
            "<human characters=\"16/2000\">First name: Chad</human>",
        ]
        .join("\n");
        assert_eq!(rendered, expected);
    }

    #[test]
    fn persona_span_with_counts() {
        let rendered = render_system_with_memory("SYS", &memory(), "now", 0, 0, true);
        assert!(rendered.contains("<persona characters=\"12/2000\">You are Sam.</persona>"));
    }

    #[test]
    fn spans_without_counts() {
        let rendered = render_system_with_memory("SYS", &memory(), "now", 0, 0, false);
        assert!(rendered.contains("<persona>You are Sam.</persona>"));
        assert!(rendered.contains("<human>First name: Chad</human>"));
        assert!(!rendered.contains("characters="));
    }

    #[test]
    fn edit_timestamp_survives_rendering() {
        let ts = DateTime::parse_from_rfc3339("2024-03-01T14:05:09Z").unwrap().with_timezone(&Utc);
        let rendered = MessageSequenceBuilder::new("SYS", &memory()).render_system(&ts, 0, 0);
        assert_eq!(parse_edit_timestamp(&rendered), Some(ts));
        assert_eq!(parse_edit_timestamp("no memory section"), None);
    }

    #[test]
    fn initial_sequence_with_boot_messages() {
        let mem = memory();
        let now = Utc::now();
        let seq = MessageSequenceBuilder::new("SYS", &mem).initial_sequence(&now, 0, 0, now);
        let roles: Vec<Role> = seq.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::Assistant, Role::Tool, Role::User]);

        assert!(seq[0].pinned);
        assert_eq!(seq[1].content, INITIAL_BOOT_MESSAGE_SEND_MESSAGE_THOUGHT);
        assert_eq!(seq[1].tool_calls.len(), 1);
        let args: serde_json::Value = serde_json::from_str(&seq[1].tool_calls[0].arguments).unwrap();
        assert_eq!(args["message"], INITIAL_BOOT_MESSAGE_SEND_MESSAGE_FIRST_MSG);
        assert_eq!(seq[2].tool_call_id.as_deref(), Some(seq[1].tool_calls[0].id.as_str()));
        assert_eq!(seq[2].name.as_deref(), Some("send_message"));

        let login: serde_json::Value = serde_json::from_str(&seq[3].content).unwrap();
        assert_eq!(login["type"], "login");
    }

    #[test]
    fn initial_sequence_without_boot_messages() {
        let mem = memory();
        let now = Utc::now();
        let seq = MessageSequenceBuilder::new("SYS", &mem)
            .with_boot_messages(false)
            .initial_sequence(&now, 0, 0, now);
        assert_eq!(seq.len(), 2);
        assert_eq!(seq[0].role, Role::System);
        let first_user = seq.iter().find(|m| m.role == Role::User).unwrap();
        let login: serde_json::Value = serde_json::from_str(&first_user.content).unwrap();
        assert_eq!(login["type"], "login");
    }
}
