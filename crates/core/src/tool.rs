//! Function-call plumbing shared by the registry, the catalog and the engine.
//!
//! A model asks for work by emitting [`MessageToolCall`]s whose arguments are
//! a JSON string. Before dispatch the string is parsed into a [`ToolCall`],
//! and the `request_heartbeat` flag is split off so the callable never sees it.

use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::message::MessageToolCall;

/// Argument name the model uses to ask for a continuation step.
pub const REQUEST_HEARTBEAT: &str = "request_heartbeat";

/// A parsed request to execute a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the function to execute
    pub name: String,

    /// Arguments as a JSON object
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Parse the raw JSON arguments of a model-issued call.
    ///
    /// Empty arguments are treated as `{}`; anything that isn't a JSON
    /// object is rejected.
    pub fn parse(call: &MessageToolCall) -> Result<Self, ToolError> {
        let raw = call.arguments.trim();
        let arguments = if raw.is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str::<serde_json::Value>(raw).map_err(|e| {
                ToolError::InvalidArguments(format!("{}: {e}", call.name))
            })?
        };
        if !arguments.is_object() {
            return Err(ToolError::InvalidArguments(format!(
                "{}: expected a JSON object, got {arguments}",
                call.name
            )));
        }
        Ok(Self {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments,
        })
    }

    /// Remove `request_heartbeat` from the arguments and report whether it
    /// was set. Accepts a boolean or the strings "true"/"True".
    pub fn take_heartbeat_request(&mut self) -> bool {
        let Some(obj) = self.arguments.as_object_mut() else {
            return false;
        };
        match obj.remove(REQUEST_HEARTBEAT) {
            Some(serde_json::Value::Bool(b)) => b,
            Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    /// Required string argument.
    pub fn str_arg(&self, key: &str) -> Result<&str, ToolError> {
        self.arguments
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ToolError::InvalidArguments(format!("{}: missing string argument '{key}'", self.name))
            })
    }

    /// Optional integer argument.
    pub fn int_arg(&self, key: &str) -> Result<Option<i64>, ToolError> {
        match self.arguments.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(v) => v.as_i64().map(Some).ok_or_else(|| {
                ToolError::InvalidArguments(format!("{}: '{key}' must be an integer", self.name))
            }),
        }
    }
}

/// The `name` field of a function schema, if present and a string.
pub fn schema_name(schema: &serde_json::Value) -> Option<&str> {
    schema.get("name").and_then(|n| n.as_str())
}
