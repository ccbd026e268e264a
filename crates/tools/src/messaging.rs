//! Talking to the user, and controlling timed heartbeats.

use crate::catalog::Function;
use crate::context::{FunctionContext, MAX_PAUSE_HEARTBEATS};
use async_trait::async_trait;
use memloop_core::error::ToolError;
use memloop_core::tool::ToolCall;
use serde_json::json;

/// Sends a visible message to the user. The only way the agent speaks.
pub struct SendMessage;

#[async_trait]
impl Function for SendMessage {
    fn name(&self) -> &str {
        "send_message"
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "name": "send_message",
            "description": "Sends a message to the human user.",
            "parameters": {
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "Message contents. All unicode (including emojis) are supported."
                    }
                },
                "required": ["message"]
            }
        })
    }

    async fn call(
        &self,
        ctx: &mut FunctionContext<'_>,
        call: &ToolCall,
    ) -> Result<Option<String>, ToolError> {
        let message = call.str_arg("message")?;
        ctx.interface.assistant_message(message, None);
        Ok(None)
    }
}

/// Suspends timed heartbeats for a while.
pub struct PauseHeartbeats;

#[async_trait]
impl Function for PauseHeartbeats {
    fn name(&self) -> &str {
        "pause_heartbeats"
    }

    fn schema(&self) -> serde_json::Value {
        json!({
            "name": "pause_heartbeats",
            "description": "Temporarily ignore timed heartbeats. You may still receive messages from manual heartbeats and other events.",
            "parameters": {
                "type": "object",
                "properties": {
                    "minutes": {
                        "type": "integer",
                        "description": format!("Number of minutes to ignore heartbeats for. Max value of {MAX_PAUSE_HEARTBEATS} minutes ({} hours).", MAX_PAUSE_HEARTBEATS / 60)
                    }
                },
                "required": ["minutes"]
            }
        })
    }

    async fn call(
        &self,
        ctx: &mut FunctionContext<'_>,
        call: &ToolCall,
    ) -> Result<Option<String>, ToolError> {
        let minutes = call.int_arg("minutes")?.ok_or_else(|| {
            ToolError::InvalidArguments("pause_heartbeats: missing integer argument 'minutes'".into())
        })?;
        let requested = u32::try_from(minutes.max(0)).unwrap_or(u32::MAX);
        let applied = ctx.heartbeat.pause(requested, ctx.now);
        Ok(Some(format!("Pausing timed heartbeats for {applied} min")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use memloop_core::interface::EventKind;

    #[tokio::test]
    async fn send_message_reaches_interface() {
        let mut fx = Fixture::new().await;
        let call = fx.call("send_message", json!({"message": "hello there"}));
        let result = SendMessage.call(&mut fx.ctx(), &call).await.unwrap();
        assert_eq!(result, None);
        assert_eq!(fx.interface.texts(EventKind::Assistant), vec!["hello there"]);
    }

    #[tokio::test]
    async fn send_message_requires_text() {
        let mut fx = Fixture::new().await;
        let call = fx.call("send_message", json!({}));
        let err = SendMessage.call(&mut fx.ctx(), &call).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn pause_reports_capped_minutes() {
        let mut fx = Fixture::new().await;
        let call = fx.call("pause_heartbeats", json!({"minutes": 999}));
        let result = PauseHeartbeats.call(&mut fx.ctx(), &call).await.unwrap();
        assert_eq!(result.as_deref(), Some("Pausing timed heartbeats for 360 min"));
        assert_eq!(fx.heartbeat.pause_minutes, 360);
        assert!(fx.heartbeat.is_paused(fx.now));
    }

    #[tokio::test]
    async fn pause_rejects_non_integer() {
        let mut fx = Fixture::new().await;
        let call = fx.call("pause_heartbeats", json!({"minutes": "soon"}));
        assert!(PauseHeartbeats.call(&mut fx.ctx(), &call).await.is_err());
    }
}
