//! Slash commands accepted at the interactive prompt.

/// Default count for `/dump`.
pub const DEFAULT_DUMP: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Dump(usize),
    Pop(usize),
    Retry,
    Rethink(String),
    Rewrite(String),
    Heartbeat,
    MemoryWarning,
    Summarize,
    Save,
    Memory,
    Help,
    Exit,
}

/// What a line typed at the prompt means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Empty,
    Message(String),
    Command(SlashCommand),
    Invalid(String),
}

pub const HELP: &str = "\
  /dump [n]         show the last n messages in context (default 10)
  /pop [n]          remove the last n messages from context (default 3)
  /retry            drop the last reply and ask again
  /rethink <text>   replace the agent's last inner monologue
  /rewrite <text>   replace the agent's last sent message
  /heartbeat        send a manual heartbeat
  /memorywarning    send a memory pressure warning
  /summarize        summarize older messages now
  /memory           show core memory
  /save             checkpoint the agent
  /exit             save and quit";

pub fn parse(input: &str) -> Line {
    let input = input.trim();
    if input.is_empty() {
        return Line::Empty;
    }
    let Some(rest) = input.strip_prefix('/') else {
        return Line::Message(input.to_string());
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "dump" => count(arg, DEFAULT_DUMP).map(SlashCommand::Dump),
        "pop" => count(arg, 3).map(SlashCommand::Pop),
        "retry" => Ok(SlashCommand::Retry),
        "rethink" => text(arg, "/rethink").map(SlashCommand::Rethink),
        "rewrite" => text(arg, "/rewrite").map(SlashCommand::Rewrite),
        "heartbeat" => Ok(SlashCommand::Heartbeat),
        "memorywarning" => Ok(SlashCommand::MemoryWarning),
        "summarize" => Ok(SlashCommand::Summarize),
        "save" => Ok(SlashCommand::Save),
        "memory" => Ok(SlashCommand::Memory),
        "help" | "?" => Ok(SlashCommand::Help),
        "exit" | "quit" => Ok(SlashCommand::Exit),
        other => Err(format!("unknown command /{other}, try /help")),
    };
    match command {
        Ok(command) => Line::Command(command),
        Err(e) => Line::Invalid(e),
    }
}

fn count(arg: &str, default: usize) -> Result<usize, String> {
    if arg.is_empty() {
        return Ok(default);
    }
    arg.parse()
        .map_err(|_| format!("expected a number, got '{arg}'"))
}

fn text(arg: &str, command: &str) -> Result<String, String> {
    if arg.is_empty() {
        Err(format!("usage: {command} <text>"))
    } else {
        Ok(arg.to_string())
    }
}
