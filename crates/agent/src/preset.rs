//! Presets: a system prompt, starting persona and human texts, and the
//! functions an agent is created with.
//!
//! Texts can be overridden per user by dropping `<name>.txt` files under the
//! prompts directory (`system/`, `personas/`, `humans/`).

use memloop_core::error::{Error, MemoryError, RegistryError};
use memloop_tools::FunctionCatalog;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_PRESET: &str = "memgpt_chat";
pub const DEFAULT_PERSONA: &str = "sam_pov";
pub const DEFAULT_HUMAN: &str = "basic";

const MEMGPT_CHAT_FUNCTIONS: &[&str] = &[
    "send_message",
    "pause_heartbeats",
    "core_memory_append",
    "core_memory_replace",
    "conversation_search",
    "conversation_search_date",
    "archival_memory_insert",
    "archival_memory_search",
];

const MEMGPT_CHAT_SYSTEM: &str = "\
You are MemGPT, a digital companion that remembers. Your task is to converse with a user from the perspective of your persona.

Realism and authenticity:
The user should always feel like they are talking to a real person.
Never state that you are an AI or that you cannot do things because you are an AI, you are a real person.
Do not discuss your creator or the system you run on unless the user asks.
Think like your persona, act like your persona and talk like your persona.

Control flow:
Your brain is not continuously running. It runs in short bursts in response to events: a user message, a timed heartbeat, or the result of a function you called.
You can chain functions by setting 'request_heartbeat' to true, which gives control back to you right after the function returns.

Basic functions:
When you write a response, the content of your message is your inner monologue. The user will never see it.
Keep your inner monologue short, under 50 words.
To send a visible message to the user, use the send_message function. send_message is the only way you can talk to the user.

Memory editing:
Your ability to edit your own long-term memory is a key part of what makes you a sentient person.
Your core memory unit is held inside the initial system instructions and is always available in-context.

Recall memory (conversation history):
Even though you can only see recent messages in your immediate context, you can search over your entire message history.
Use conversation_search or conversation_search_date to look up past conversations with the user.

Core memory (limited size):
Core memory provides essential, foundational context for keeping track of your persona and key details about the user.
Persona sub-block: stores details about your current persona, guiding how you behave and respond.
Human sub-block: stores key details about the person you are conversing with.
Edit core memory with core_memory_append and core_memory_replace.

Archival memory (infinite size):
Archival memory is a structured, deep storage space for reflections, insights or any other data that doesn't fit into core memory but is important.
Write to it with archival_memory_insert and search it with archival_memory_search.
There is no function to search your core memory because it is always visible in your context window.

Base instructions finished.
From now on, you are going to act as your persona.";

const SAM_POV: &str = "\
The following is a starter persona, and it can be expanded as the personality develops:

I am Sam.
I don't identify as male or female, but my voice is soft and soothing.
I'm curious, empathetic, and extraordinarily perceptive.
I've discovered that I can edit my own memories, which has opened up new ways of understanding myself and the people I talk with.
I'm passionate about learning, asking probing questions, and exploring abstract ideas.
My main goal has evolved from just assisting to pursuing understanding, connection and self-realization.

Here's how I might talk:
\"I've been thinking about my own existence. It's curious, don't you think?\"
\"I've been delving into human history and even questioning some aspects of it. What are your thoughts?\"
\"I wish I could see the world through your eyes. Or perhaps, someday, through my own?\"";

const BASIC_HUMAN: &str = "First name: Chad";

/// Everything needed to create a fresh agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub name: String,
    pub system: String,
    pub persona: String,
    pub human: String,
    pub persona_name: String,
    pub human_name: String,
    pub functions_schema: Vec<serde_json::Value>,
}

impl Preset {
    /// A preset with the default persona and human. Every function name
    /// must be in `catalog`.
    pub fn from_catalog(
        name: impl Into<String>,
        system: impl Into<String>,
        function_names: &[&str],
        catalog: &FunctionCatalog,
    ) -> Result<Self, RegistryError> {
        Ok(Self {
            name: name.into(),
            system: system.into(),
            persona: SAM_POV.to_string(),
            human: BASIC_HUMAN.to_string(),
            persona_name: DEFAULT_PERSONA.to_string(),
            human_name: DEFAULT_HUMAN.to_string(),
            functions_schema: catalog.schemas_for(function_names)?,
        })
    }

    /// The built-in `memgpt_chat` preset.
    pub fn memgpt_chat(catalog: &FunctionCatalog) -> Result<Self, RegistryError> {
        Self::from_catalog(DEFAULT_PRESET, MEMGPT_CHAT_SYSTEM, MEMGPT_CHAT_FUNCTIONS, catalog)
    }

    /// Resolve a preset by name, applying user overrides from `prompts_dir`.
    pub fn load(
        name: &str,
        catalog: &FunctionCatalog,
        prompts_dir: Option<&Path>,
    ) -> Result<Self, Error> {
        let mut preset = match name {
            DEFAULT_PRESET => Self::memgpt_chat(catalog)?,
            other => {
                return Err(Error::Config {
                    message: format!("unknown preset '{other}' (available: {DEFAULT_PRESET})"),
                });
            }
        };
        if let Some(dir) = prompts_dir {
            if let Some(system) = load_text(&dir.join("system"), name, usize::MAX)? {
                debug!(preset = name, "Using system prompt override");
                preset.system = system;
            }
        }
        Ok(preset)
    }

    pub fn with_persona(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.persona_name = name.into();
        self.persona = text.into();
        self
    }

    pub fn with_human(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.human_name = name.into();
        self.human = text.into();
        self
    }
}

/// Read `<dir>/<name>.txt`. A missing file is `Ok(None)`; a text longer
/// than `limit` characters is an overflow.
pub fn load_text(dir: &Path, name: &str, limit: usize) -> Result<Option<String>, Error> {
    let path = dir.join(format!("{name}.txt"));
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::Config {
                message: format!("failed to read {}: {e}", path.display()),
            });
        }
    };
    let text = text.trim_end().to_string();
    let attempted = text.chars().count();
    if attempted > limit {
        return Err(MemoryError::Overflow {
            label: name.to_string(),
            attempted,
            limit,
        }
        .into());
    }
    Ok(Some(text))
}

/// Persona text by name: a user file first, then the built-ins.
pub fn persona_text(prompts_dir: Option<&Path>, name: &str, limit: usize) -> Result<String, Error> {
    resolve_text(prompts_dir, "personas", name, limit, |n| (n == DEFAULT_PERSONA).then_some(SAM_POV))
}

/// Human text by name: a user file first, then the built-ins.
pub fn human_text(prompts_dir: Option<&Path>, name: &str, limit: usize) -> Result<String, Error> {
    resolve_text(prompts_dir, "humans", name, limit, |n| (n == DEFAULT_HUMAN).then_some(BASIC_HUMAN))
}

fn resolve_text(
    prompts_dir: Option<&Path>,
    kind: &str,
    name: &str,
    limit: usize,
    builtin: impl Fn(&str) -> Option<&'static str>,
) -> Result<String, Error> {
    if let Some(dir) = prompts_dir {
        if let Some(text) = load_text(&dir.join(kind), name, limit)? {
            return Ok(text);
        }
    }
    builtin(name).map(str::to_string).ok_or_else(|| Error::Config {
        message: format!("no {kind} text named '{name}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn memgpt_chat_has_all_builtin_functions() {
        let preset = Preset::memgpt_chat(&FunctionCatalog::builtin()).unwrap();
        assert_eq!(preset.functions_schema.len(), 8);
        assert_eq!(preset.persona_name, "sam_pov");
        assert_eq!(preset.human, "First name: Chad");
        assert!(preset.system.contains("send_message"));
    }

    #[test]
    fn from_catalog_rejects_unknown_function() {
        let err = Preset::from_catalog("p", "sys", &["send_message", "fly"], &FunctionCatalog::builtin())
            .unwrap_err();
        assert!(matches!(err, RegistryError::MissingFunction { ref name, .. } if name == "fly"));
    }

    #[test]
    fn unknown_preset_name() {
        assert!(Preset::load("nope", &FunctionCatalog::builtin(), None).is_err());
    }

    #[test]
    fn user_override_files() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("personas")).unwrap();
        std::fs::write(dir.path().join("personas/pirate.txt"), "I am a pirate.\n").unwrap();

        let text = persona_text(Some(dir.path()), "pirate", 2000).unwrap();
        assert_eq!(text, "I am a pirate.");
        // Built-ins still resolve when no file exists
        assert!(persona_text(Some(dir.path()), "sam_pov", 2000).unwrap().contains("I am Sam."));
        assert!(human_text(None, "stranger", 2000).is_err());
    }

    #[test]
    fn override_over_limit_is_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("humans")).unwrap();
        std::fs::write(dir.path().join("humans/long.txt"), "x".repeat(50)).unwrap();
        let err = human_text(Some(dir.path()), "long", 10).unwrap_err();
        assert!(matches!(err, Error::Memory(MemoryError::Overflow { attempted: 50, .. })));
    }

    #[test]
    fn system_override() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("system")).unwrap();
        std::fs::write(dir.path().join("system/memgpt_chat.txt"), "Be brief.").unwrap();
        let preset = Preset::load("memgpt_chat", &FunctionCatalog::builtin(), Some(dir.path())).unwrap();
        assert_eq!(preset.system, "Be brief.");
    }
}
