//! Links an agent's declared function schemas to catalog implementations.
//!
//! Agents persist schemas only. On load every declared schema is matched by
//! name against the [`FunctionCatalog`]; a name the catalog doesn't know is
//! fatal, while a schema that merely differs from the catalog's is recorded
//! as [`SchemaDrift`] and the catalog implementation is bound anyway.

use memloop_core::error::RegistryError;
use memloop_core::tool::schema_name;
use memloop_tools::{Function, FunctionCatalog};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// A declared function name bound to its implementation.
#[derive(Clone)]
pub struct FunctionBinding {
    pub name: String,
    /// The catalog's schema for this function
    pub json_schema: serde_json::Value,
    pub callable: Arc<dyn Function>,
}

impl std::fmt::Debug for FunctionBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionBinding")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A declared schema that doesn't match the catalog's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDrift {
    pub name: String,
    /// Line diff of the pretty-printed schemas, declared (`-`) vs catalog (`+`)
    pub diff: String,
}

/// Immutable name → binding map for one agent.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    bindings: BTreeMap<String, FunctionBinding>,
    declared: Vec<serde_json::Value>,
    drift: Vec<SchemaDrift>,
}

impl FunctionRegistry {
    /// Bind every declared schema to the catalog.
    pub fn link(
        declared: &[serde_json::Value],
        catalog: &FunctionCatalog,
    ) -> Result<Self, RegistryError> {
        let available = catalog.list_available_functions();
        let mut bindings = BTreeMap::new();
        let mut drift = Vec::new();

        for schema in declared {
            let name = schema_name(schema).ok_or_else(|| {
                RegistryError::MalformedSchema(format!("function schema has no name: {schema}"))
            })?;
            if bindings.contains_key(name) {
                return Err(RegistryError::MalformedSchema(format!(
                    "function '{name}' declared more than once"
                )));
            }
            let callable = available
                .get(name)
                .cloned()
                .ok_or_else(|| RegistryError::MissingFunction {
                    name: name.to_string(),
                    available: available.keys().cloned().collect(),
                })?;

            let json_schema = callable.schema();
            if *schema != json_schema {
                let diff = line_diff(&pretty(schema), &pretty(&json_schema));
                warn!(function = name, "Declared schema differs from the function library\n{diff}");
                drift.push(SchemaDrift {
                    name: name.to_string(),
                    diff,
                });
            }

            bindings.insert(
                name.to_string(),
                FunctionBinding {
                    name: name.to_string(),
                    json_schema,
                    callable,
                },
            );
        }

        Ok(Self {
            bindings,
            declared: declared.to_vec(),
            drift,
        })
    }

    pub fn get(&self, name: &str) -> Option<&FunctionBinding> {
        self.bindings.get(name)
    }

    /// Bound names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn bindings(&self) -> &BTreeMap<String, FunctionBinding> {
        &self.bindings
    }

    /// The schemas as declared by the agent, in declaration order. These are
    /// what the model sees and what gets checkpointed.
    pub fn schemas(&self) -> &[serde_json::Value] {
        &self.declared
    }

    pub fn drift(&self) -> &[SchemaDrift] {
        &self.drift
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Line-oriented diff based on the longest common subsequence.
///
/// Unchanged lines are prefixed with two spaces, removed lines with `- `
/// and added lines with `+ `. Identical inputs give an empty string.
pub fn line_diff(old: &str, new: &str) -> String {
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();
    if a == b {
        return String::new();
    }

    // lcs[i][j] = LCS length of a[i..] and b[j..]
    let mut lcs = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for i in (0..a.len()).rev() {
        for j in (0..b.len()).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut out = String::from("--- declared\n+++ library\n");
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] == b[j] {
            out.push_str(&format!("  {}\n", a[i]));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            out.push_str(&format!("- {}\n", a[i]));
            i += 1;
        } else {
            out.push_str(&format!("+ {}\n", b[j]));
            j += 1;
        }
    }
    for line in &a[i..] {
        out.push_str(&format!("- {line}\n"));
    }
    for line in &b[j..] {
        out.push_str(&format!("+ {line}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn declared(names: &[&str]) -> Vec<serde_json::Value> {
        FunctionCatalog::builtin().schemas_for(names).unwrap()
    }

    #[test]
    fn links_matching_schemas_without_drift() {
        let catalog = FunctionCatalog::builtin();
        let registry = FunctionRegistry::link(
            &declared(&["send_message", "core_memory_append", "archival_memory_search"]),
            &catalog,
        )
        .unwrap();
        assert_eq!(registry.len(), 3);
        assert!(registry.drift().is_empty());
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["archival_memory_search", "core_memory_append", "send_message"]
        );
    }

    #[test]
    fn linking_is_deterministic() {
        let catalog = FunctionCatalog::builtin();
        let schemas = declared(&["pause_heartbeats", "send_message", "conversation_search"]);
        let a = FunctionRegistry::link(&schemas, &catalog).unwrap();
        let b = FunctionRegistry::link(&schemas, &catalog).unwrap();
        assert_eq!(a.names().collect::<Vec<_>>(), b.names().collect::<Vec<_>>());
        assert_eq!(a.schemas(), b.schemas());
    }

    #[test]
    fn unknown_function_is_fatal() {
        let mut schemas = declared(&["send_message"]);
        schemas.push(json!({"name": "launch_rockets", "parameters": {}}));
        let err = FunctionRegistry::link(&schemas, &FunctionCatalog::builtin()).unwrap_err();
        match err {
            RegistryError::MissingFunction { name, available } => {
                assert_eq!(name, "launch_rockets");
                assert!(available.contains(&"send_message".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn nameless_schema_is_fatal() {
        let schemas = vec![json!({"description": "mystery"})];
        let err = FunctionRegistry::link(&schemas, &FunctionCatalog::builtin()).unwrap_err();
        assert!(matches!(err, RegistryError::MalformedSchema(_)));
    }

    #[test]
    fn duplicate_declaration_is_fatal() {
        let schemas = declared(&["send_message", "send_message"]);
        let err = FunctionRegistry::link(&schemas, &FunctionCatalog::builtin()).unwrap_err();
        assert!(matches!(err, RegistryError::MalformedSchema(_)));
    }

    #[test]
    fn drifted_schema_still_binds_library_function() {
        let catalog = FunctionCatalog::builtin();
        let mut schemas = declared(&["send_message"]);
        schemas[0]["description"] = json!("Sends a message to the human user (old wording).");

        let registry = FunctionRegistry::link(&schemas, &catalog).unwrap();
        let binding = registry.get("send_message").unwrap();
        assert_eq!(binding.callable.name(), "send_message");
        assert_eq!(binding.json_schema, catalog.get("send_message").unwrap().schema());

        assert_eq!(registry.drift().len(), 1);
        let drift = &registry.drift()[0];
        assert_eq!(drift.name, "send_message");
        assert!(!drift.diff.is_empty());
        assert!(drift.diff.contains("- "));
        assert!(drift.diff.contains("old wording"));
        // The declared schema is kept for the model and the checkpoint
        assert_eq!(registry.schemas(), schemas.as_slice());
    }

    #[test]
    fn diff_of_identical_text_is_empty() {
        assert_eq!(line_diff("a\nb", "a\nb"), "");
    }

    #[test]
    fn diff_marks_changed_lines() {
        let diff = line_diff("a\nb\nc", "a\nx\nc");
        assert!(diff.contains("  a\n"));
        assert!(diff.contains("- b\n"));
        assert!(diff.contains("+ x\n"));
        assert!(diff.contains("  c\n"));
    }
}
