//! Terminal rendering of agent events.

use memloop_core::interface::{AgentInterface, ChunkConsumer};
use memloop_core::message::Message;
use memloop_core::provider::StreamChunk;
use std::io::Write;

/// Prints every agent event with a role prefix.
pub struct ConsoleInterface {
    /// Skip monologue lines already printed by [`ConsoleStream`]
    streaming: bool,
    /// Show function calls and results
    show_functions: bool,
}

impl ConsoleInterface {
    pub fn new(streaming: bool, show_functions: bool) -> Self {
        Self {
            streaming,
            show_functions,
        }
    }
}

impl AgentInterface for ConsoleInterface {
    fn user_message(&self, _text: &str, _message: Option<&Message>) {}

    fn internal_monologue(&self, text: &str, _message: Option<&Message>) {
        if self.streaming {
            return;
        }
        for line in text.lines() {
            println!("  💭 {line}");
        }
    }

    fn assistant_message(&self, text: &str, _message: Option<&Message>) {
        println!();
        for line in text.lines() {
            println!("  Assistant > {line}");
        }
        println!();
    }

    fn function_message(&self, text: &str, _message: Option<&Message>) {
        if self.show_functions {
            println!("  ⚡ {text}");
        }
    }
}

/// Prints model output as it arrives.
#[derive(Default)]
pub struct ConsoleStream;

impl ChunkConsumer for ConsoleStream {
    fn stream_start(&self) {
        print!("  💭 ");
        let _ = std::io::stdout().flush();
    }

    fn process_chunk(&self, chunk: &StreamChunk) {
        if let Some(text) = &chunk.content {
            print!("{}", text.replace('\n', "\n     "));
            let _ = std::io::stdout().flush();
        }
    }

    fn stream_end(&self) {
        println!();
    }
}
