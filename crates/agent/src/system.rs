//! Synthetic events and packaged results the engine feeds back to the model.
//!
//! Everything here is a small JSON object with a `type` (or `status`) and a
//! `time`, delivered in the user or tool slot of the context.

use chrono::{DateTime, Utc};
use memloop_core::message::format_timestamp;
use serde_json::json;

pub const INITIAL_BOOT_MESSAGE_SEND_MESSAGE_THOUGHT: &str =
    "Bootup sequence complete. Persona activated. Testing messaging functionality.";
pub const INITIAL_BOOT_MESSAGE_SEND_MESSAGE_FIRST_MSG: &str = "More human than human is our motto.";

const HIDDEN: &str = "[This is an automated system message hidden from the user]";

/// `{"type":"login","last_login":...,"time":...}`.
pub fn login_event(last_login: Option<&str>, now: DateTime<Utc>) -> String {
    json!({
        "type": "login",
        "last_login": last_login.unwrap_or("Never (first login)"),
        "time": format_timestamp(&now),
    })
    .to_string()
}

/// Wraps user input so the model can tell it from system events.
pub fn user_message(text: &str, now: DateTime<Utc>) -> String {
    json!({
        "type": "user_message",
        "message": text,
        "time": format_timestamp(&now),
    })
    .to_string()
}

/// Sent when a function asked for an immediate follow-up.
pub fn heartbeat_requested(now: DateTime<Utc>) -> String {
    heartbeat(
        &format!("{HIDDEN} Function called using request_heartbeat=true, returning control"),
        now,
    )
}

/// Sent after a failed function call so the model can react to the error.
pub fn function_failed(now: DateTime<Utc>) -> String {
    heartbeat(&format!("{HIDDEN} Function call failed, returning control"), now)
}

/// Sent by the operator's manual `/heartbeat`.
pub fn manual_heartbeat(now: DateTime<Utc>) -> String {
    heartbeat(&format!("{HIDDEN} Heartbeat triggered by the user"), now)
}

/// Sent when the agent has been idle for the configured interval.
pub fn timed_heartbeat(now: DateTime<Utc>) -> String {
    heartbeat(&format!("{HIDDEN} Timed heartbeat, no new user input"), now)
}

fn heartbeat(reason: &str, now: DateTime<Utc>) -> String {
    json!({
        "type": "heartbeat",
        "reason": reason,
        "time": format_timestamp(&now),
    })
    .to_string()
}

/// Warns the model that older messages are about to be evicted.
pub fn memory_pressure_warning(now: DateTime<Utc>) -> String {
    system_alert(
        &format!(
            "{HIDDEN} Warning: the conversation history will soon reach its maximum length and be trimmed. \
             Make sure to save any important information from the conversation to your memory before it is removed."
        ),
        now,
    )
}

/// Appended when a heartbeat chain is cut short.
pub fn chain_truncated(continuations: u32, now: DateTime<Utc>) -> String {
    system_alert(
        &format!(
            "{HIDDEN} Heartbeat chain stopped after {continuations} continuations. \
             Control has returned to the user."
        ),
        now,
    )
}

/// Placed right after the system message once older messages are evicted.
pub fn summary_note(summary: &str, hidden: usize, total: usize, now: DateTime<Utc>) -> String {
    system_alert(
        &format!(
            "Note: prior messages ({hidden} of {total} total messages) have been hidden from view due to conversation memory constraints.\n\
             The following is a summary of the previous {hidden} messages:\n {summary}"
        ),
        now,
    )
}

fn system_alert(message: &str, now: DateTime<Utc>) -> String {
    json!({
        "type": "system_alert",
        "message": message,
        "time": format_timestamp(&now),
    })
    .to_string()
}

/// `{"status":"OK"|"Failed","message":...,"time":...}`. A missing message is `null`.
pub fn package_function_response(ok: bool, message: Option<&str>, now: DateTime<Utc>) -> String {
    json!({
        "status": if ok { "OK" } else { "Failed" },
        "message": message,
        "time": format_timestamp(&now),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 14, 5, 9).unwrap()
    }

    #[test]
    fn login_event_shape() {
        let v: serde_json::Value = serde_json::from_str(&login_event(None, at())).unwrap();
        assert_eq!(v["type"], "login");
        assert_eq!(v["last_login"], "Never (first login)");
        assert_eq!(v["time"], "2024-03-01 02:05:09 PM UTC+0000");
    }

    #[test]
    fn function_response_ok_and_failed() {
        let ok: serde_json::Value =
            serde_json::from_str(&package_function_response(true, None, at())).unwrap();
        assert_eq!(ok["status"], "OK");
        assert!(ok["message"].is_null());

        let failed: serde_json::Value =
            serde_json::from_str(&package_function_response(false, Some("boom"), at())).unwrap();
        assert_eq!(failed["status"], "Failed");
        assert_eq!(failed["message"], "boom");
    }

    #[test]
    fn non_ascii_is_not_escaped() {
        let out = user_message("héllo 👋", at());
        assert!(out.contains("héllo 👋"));
    }

    #[test]
    fn summary_note_mentions_counts() {
        let out = summary_note("they talked about cats", 12, 40, at());
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["type"], "system_alert");
        let text = v["message"].as_str().unwrap();
        assert!(text.contains("12 of 40 total messages"));
        assert!(text.contains("they talked about cats"));
    }

    #[test]
    fn heartbeat_kinds() {
        for event in [heartbeat_requested(at()), function_failed(at()), manual_heartbeat(at())] {
            let v: serde_json::Value = serde_json::from_str(&event).unwrap();
            assert_eq!(v["type"], "heartbeat");
        }
    }
}
