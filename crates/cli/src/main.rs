//! memloop CLI: the main entry point.
//!
//! Commands:
//! - `onboard`: Initialize config and prompt directories
//! - `run`:     Chat with an agent (created on first use)
//! - `agents`:  List saved agents

use clap::{Parser, Subcommand};

mod commands;
mod console;
mod repl;

#[derive(Parser)]
#[command(
    name = "memloop",
    about = "memloop: agents with self-managed memory",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and prompt directories
    Onboard,

    /// Chat with an agent
    Run {
        /// Agent name; a new agent is created if none exists
        #[arg(short, long)]
        agent: Option<String>,

        /// Persona for a new agent
        #[arg(long)]
        persona: Option<String>,

        /// Human description for a new agent
        #[arg(long)]
        human: Option<String>,

        /// Preset for a new agent
        #[arg(long)]
        preset: Option<String>,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Print model output as it arrives
        #[arg(long)]
        stream: bool,

        /// Show function calls and their results
        #[arg(long)]
        debug_functions: bool,
    },

    /// List saved agents
    Agents,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Run {
            agent,
            persona,
            human,
            preset,
            message,
            stream,
            debug_functions,
        } => {
            commands::run::run(commands::run::RunArgs {
                agent,
                persona,
                human,
                preset,
                message,
                stream,
                show_functions: debug_functions || cli.verbose,
            })
            .await?
        }
        Commands::Agents => commands::agents::run().await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from(["memloop", "run", "--agent", "sam", "--stream", "-v"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run { agent, stream, message, .. } => {
                assert_eq!(agent.as_deref(), Some("sam"));
                assert!(stream);
                assert!(message.is_none());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["memloop", "gateway"]).is_err());
    }
}
