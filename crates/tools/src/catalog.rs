//! The `Function` trait and the catalog of available implementations.
//!
//! A function pairs a JSON schema (what the model sees) with an async
//! callable (what actually runs). The catalog is the fixed library an agent's
//! declared schemas are linked against.

use async_trait::async_trait;
use memloop_core::error::{RegistryError, ToolError};
use memloop_core::tool::ToolCall;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::FunctionContext;

/// A callable the model can invoke.
#[async_trait]
pub trait Function: Send + Sync {
    /// The unique name of this function (e.g., "send_message").
    fn name(&self) -> &str;

    /// The full schema: `{name, description, parameters}`.
    fn schema(&self) -> serde_json::Value;

    /// Run the function. `call.arguments` no longer contains
    /// `request_heartbeat`. `Ok(None)` means "nothing to report".
    async fn call(
        &self,
        ctx: &mut FunctionContext<'_>,
        call: &ToolCall,
    ) -> Result<Option<String>, ToolError>;
}

/// Add the `request_heartbeat` parameter to a schema.
pub fn with_heartbeat(mut schema: serde_json::Value) -> serde_json::Value {
    let params = &mut schema["parameters"];
    params["properties"]["request_heartbeat"] = serde_json::json!({
        "type": "boolean",
        "description": "Request an immediate heartbeat after function execution. Set to `true` if you want to send a follow-up message or run a follow-up function."
    });
    match params["required"].as_array_mut() {
        Some(required) => required.push(serde_json::json!("request_heartbeat")),
        None => params["required"] = serde_json::json!(["request_heartbeat"]),
    }
    schema
}

/// The library of functions an agent can be linked against.
#[derive(Clone, Default)]
pub struct FunctionCatalog {
    functions: BTreeMap<String, Arc<dyn Function>>,
}

impl FunctionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All built-in functions.
    pub fn builtin() -> Self {
        Self::new()
            .with(Arc::new(crate::messaging::SendMessage))
            .with(Arc::new(crate::messaging::PauseHeartbeats))
            .with(Arc::new(crate::core_memory::CoreMemoryAppend))
            .with(Arc::new(crate::core_memory::CoreMemoryReplace))
            .with(Arc::new(crate::recall_search::ConversationSearch))
            .with(Arc::new(crate::recall_search::ConversationSearchDate))
            .with(Arc::new(crate::archival::ArchivalMemoryInsert))
            .with(Arc::new(crate::archival::ArchivalMemorySearch))
    }

    /// Add a function. Replaces any existing function with the same name.
    pub fn with(mut self, function: Arc<dyn Function>) -> Self {
        self.functions.insert(function.name().to_string(), function);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Function>> {
        self.functions.get(name)
    }

    /// Every function, keyed by name.
    pub fn list_available_functions(&self) -> BTreeMap<String, Arc<dyn Function>> {
        self.functions.clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }

    /// Schemas for `names`, in the order given.
    pub fn schemas_for<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<serde_json::Value>, RegistryError> {
        names
            .iter()
            .map(|name| {
                self.functions
                    .get(name.as_ref())
                    .map(|f| f.schema())
                    .ok_or_else(|| RegistryError::MissingFunction {
                        name: name.as_ref().to_string(),
                        available: self.names(),
                    })
            })
            .collect()
    }
}
