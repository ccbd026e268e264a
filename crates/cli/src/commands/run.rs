//! `memloop run`: chat with an agent, creating it on first use.

use memloop_agent::preset::{human_text, persona_text};
use memloop_agent::{Agent, AgentDeps, AgentSettings, Condensation, Preset, RunOutcome, StepInput};
use memloop_config::AppConfig;
use memloop_core::error::{AgentError, Error};
use memloop_core::interface::Presentation;
use memloop_core::message::{Message, Role};
use memloop_providers::{OpenAiCompatProvider, RetryPolicy, RetryingProvider};
use memloop_tools::FunctionCatalog;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, BufReader};

use super::{local_user_id, prompts_dir, CliResult, Stores};
use crate::console::{ConsoleInterface, ConsoleStream};
use crate::repl::{self, Line, SlashCommand};

/// Options for `memloop run`.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub agent: Option<String>,
    pub persona: Option<String>,
    pub human: Option<String>,
    pub preset: Option<String>,
    pub message: Option<String>,
    pub stream: bool,
    pub show_functions: bool,
}

/// What the operator asked the agent to do next.
enum Turn {
    Input(StepInput),
    Retry,
    Heartbeat,
    TimedHeartbeat,
    MemoryWarning,
}

pub async fn run(args: RunArgs) -> CliResult {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let user_id = local_user_id()?;
    let stores = Stores::open(&config);
    let catalog = Arc::new(FunctionCatalog::builtin());
    let settings = AgentSettings::from_config(&config);
    let name = args
        .agent
        .clone()
        .unwrap_or_else(|| format!("agent_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]));

    let existing = stores.agents.get_agent_state(&name, user_id).await?;
    let llm_config = existing
        .as_ref()
        .map(|state| state.llm_config.clone())
        .unwrap_or_else(|| config.llm_config());

    let inner = OpenAiCompatProvider::from_llm_config(&llm_config, config.api_key.as_deref())?;
    let provider = Arc::new(RetryingProvider::new(
        Arc::new(inner),
        RetryPolicy::from_config(&config.retry),
    ));
    let interface = Arc::new(ConsoleInterface::new(args.stream, args.show_functions));
    let presentation = if args.stream {
        Presentation::Incremental(Arc::new(ConsoleStream))
    } else {
        Presentation::Full
    };
    let deps = AgentDeps::new(provider, catalog.clone(), interface)
        .with_stores(stores.messages.clone(), stores.archival.clone(), stores.agents.clone())
        .with_presentation(presentation);

    let mut agent = match existing {
        Some(state) => {
            let agent = Agent::load(state, settings, deps).await?;
            for drift in agent.registry().drift() {
                eprintln!("  [Warning] function '{}' differs from the library version:", drift.name);
                for line in drift.diff.lines() {
                    eprintln!("    {line}");
                }
            }
            agent
        }
        None => {
            let prompts = prompts_dir(&config);
            let preset_name = args.preset.as_deref().unwrap_or(&config.default_preset);
            let persona_name = args.persona.as_deref().unwrap_or(&config.default_persona);
            let human_name = args.human.as_deref().unwrap_or(&config.default_human);
            let preset = Preset::load(preset_name, &catalog, Some(prompts.as_path()))?
                .with_persona(
                    persona_name,
                    persona_text(Some(prompts.as_path()), persona_name, settings.persona_char_limit)?,
                )
                .with_human(
                    human_name,
                    human_text(Some(prompts.as_path()), human_name, settings.human_char_limit)?,
                );
            let mut agent = Agent::create(
                &name,
                user_id,
                &preset,
                llm_config,
                config.embedding_config(),
                settings,
                deps,
            )
            .await?;
            agent.save().await?;
            agent
        }
    };

    if let Some(message) = args.message {
        take_turn(&mut agent, Turn::Input(StepInput::User(message))).await;
        agent.save().await?;
        return Ok(());
    }

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║          memloop: Interactive Mode           ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Agent:     {}", agent.name());
    println!("  Model:     {}", agent.state().llm_config.model);
    println!("  Endpoint:  {}", agent.state().llm_config.model_endpoint);
    println!("  Persona:   {}", agent.state().persona_name);
    println!("  Human:     {}", agent.state().human_name);
    println!("  Messages:  {} in context, {} in recall", agent.messages().len(), agent.recall().count());
    println!();
    println!("  Type your message and press Enter. /help lists commands.");
    println!();

    let idle_heartbeat = config.agent.heartbeat_interval();
    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;
        let line = match idle_heartbeat {
            Some(interval) => tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::time::sleep(interval) => {
                    println!();
                    take_turn(&mut agent, Turn::TimedHeartbeat).await;
                    autosave(&mut agent).await;
                    continue;
                }
            },
            None => lines.next_line().await?,
        };
        let Some(line) = line else {
            break;
        };

        let command = match repl::parse(&line) {
            Line::Empty => continue,
            Line::Invalid(e) => {
                eprintln!("  [Error] {e}");
                continue;
            }
            Line::Message(text) => {
                take_turn(&mut agent, Turn::Input(StepInput::User(text))).await;
                autosave(&mut agent).await;
                continue;
            }
            Line::Command(command) => command,
        };

        match command {
            SlashCommand::Dump(n) => {
                for message in agent.dump(n) {
                    print_message(message);
                }
            }
            SlashCommand::Pop(n) => match agent.pop_messages(n) {
                Ok(popped) => println!("  Popped {} messages", popped.len()),
                Err(e) => eprintln!("  [Error] {e}"),
            },
            SlashCommand::Retry => {
                take_turn(&mut agent, Turn::Retry).await;
                autosave(&mut agent).await;
            }
            SlashCommand::Rethink(text) => {
                if let Err(e) = agent.rethink(&text).await {
                    eprintln!("  [Error] {e}");
                }
            }
            SlashCommand::Rewrite(text) => {
                if let Err(e) = agent.rewrite(&text).await {
                    eprintln!("  [Error] {e}");
                }
            }
            SlashCommand::Heartbeat => {
                take_turn(&mut agent, Turn::Heartbeat).await;
                autosave(&mut agent).await;
            }
            SlashCommand::MemoryWarning => {
                take_turn(&mut agent, Turn::MemoryWarning).await;
                autosave(&mut agent).await;
            }
            SlashCommand::Summarize => match agent.summarize(Condensation::Model).await {
                Ok(report) => println!(
                    "  Summarized {} messages ({} → {} tokens)",
                    report.evicted, report.tokens_before, report.tokens_after
                ),
                Err(e) => eprintln!("  [Error] {e}"),
            },
            SlashCommand::Memory => println!("{}", agent.memory()),
            SlashCommand::Save => match agent.save().await {
                Ok(()) => println!("  Saved {}", agent.name()),
                Err(e) => eprintln!("  [Error] {e}"),
            },
            SlashCommand::Help => println!("{}", repl::HELP),
            SlashCommand::Exit => break,
        }
    }

    agent.save().await?;
    println!();
    println!("  Saved {}. Goodbye! 👋", agent.name());
    println!();
    Ok(())
}

/// Run one operator turn; Ctrl+C cancels the in-flight step.
async fn take_turn(agent: &mut Agent, turn: Turn) {
    let token = agent.cancellation_token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let result = match turn {
        Turn::Input(input) => agent.run(input).await,
        Turn::Retry => agent.retry_last().await,
        Turn::Heartbeat => agent.heartbeat().await,
        Turn::TimedHeartbeat => agent.timed_heartbeat().await,
        Turn::MemoryWarning => agent.memory_warning().await,
    };
    watcher.abort();

    match result {
        Ok(outcome) => report(&outcome),
        Err(Error::Agent(AgentError::Cancelled)) => {
            eprintln!("  [Cancelled]");
            agent.renew_cancellation();
        }
        Err(e) => eprintln!("  [Error] {e}"),
    }
}

fn report(outcome: &RunOutcome) {
    if outcome.paused {
        tracing::debug!("Timed heartbeat skipped, heartbeats are paused");
        return;
    }
    if let Some(summary) = &outcome.summarized {
        println!(
            "  [Memory] summarized {} older messages ({} → {} tokens)",
            summary.evicted, summary.tokens_before, summary.tokens_after
        );
    }
    if outcome.truncated {
        println!(
            "  [Notice] stopped after {} heartbeat continuations",
            outcome.continuations
        );
    }
    tracing::debug!(
        steps = outcome.steps,
        continuations = outcome.continuations,
        total_tokens = outcome.usage.total_tokens,
        "Turn complete"
    );
}

async fn autosave(agent: &mut Agent) {
    if let Err(e) = agent.save().await {
        tracing::warn!(agent = %agent.name(), error = %e, "Autosave failed");
    }
}

fn print_message(message: &Message) {
    let label = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "function",
    };
    let content = if message.role == Role::System {
        format!("({} chars)", message.content.chars().count())
    } else {
        message.content.clone()
    };
    println!("  [{label}] {content}");
    for call in &message.tool_calls {
        println!("      ⚡ {}({})", call.name, call.arguments);
    }
}
