//! The agent step engine.
//!
//! An [`Agent`] owns one agent's in-context state: the system prompt, core
//! memory, the in-context message list and the heartbeat pause. Every change
//! goes through `&mut self`, so a single agent is a sequential state machine:
//!
//! ```text
//! AWAITING_INPUT → MODEL_CALL → FUNCTION_DISPATCH → MODEL_CALL (heartbeat)
//!                            ↘                   ↘ AWAITING_INPUT
//!                             TERMINAL (error / cancelled)
//! ```
//!
//! A step works on staged copies and commits only once the model's whole
//! batch of function calls is resolved; an error before that point leaves
//! the agent exactly as it was.

use crate::builder::{parse_edit_timestamp, render_system_with_memory, MessageSequenceBuilder};
use crate::preset::Preset;
use crate::registry::FunctionRegistry;
use crate::summarize::{
    eviction_boundaries, excerpt, transcript, truncate_chars, Condensation, SummaryReport,
    EXCERPT_CHARS, SUMMARY_MAX_TOKENS, SUMMARY_SYSTEM_PROMPT,
};
use crate::system;
use crate::token::{estimate_message_tokens, estimate_messages_tokens, estimate_schema_tokens};
use chrono::{DateTime, Utc};
use memloop_config::AppConfig;
use memloop_core::agent::{AgentState, AgentStore, EmbeddingConfig, LlmConfig, StateBag};
use memloop_core::error::{AgentError, Error, ProviderError, ToolError};
use memloop_core::interface::{AgentInterface, ChunkConsumer, Presentation};
use memloop_core::memory::{ArchivalStore, CoreMemory, MessageStore};
use memloop_core::message::{format_timestamp, Message, MessageToolCall, Role};
use memloop_core::provider::{
    FunctionCallMode, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage,
};
use memloop_core::tool::ToolCall;
use memloop_core::Result;
use memloop_memory::{ArchivalMemory, InMemoryStore, RecallMemory};
use memloop_tools::{FunctionCatalog, FunctionContext, HeartbeatState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Engine tuning, usually derived from [`AppConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    /// Maximum continuations `run` will chain after the first step
    pub max_heartbeat_chain: u32,
    pub max_chain_duration: Duration,
    pub first_message_attempts: u32,
    pub verify_first_message: bool,
    /// Fraction of the context window that triggers a token warning
    pub memory_warning_threshold: f32,
    /// Summarize instead of warning the model
    pub auto_summarize: bool,
    /// Summarization target as a fraction of the warning level
    pub summarize_fraction: f32,
    pub include_char_count: bool,
    pub boot_messages: bool,
    pub persona_char_limit: usize,
    pub human_char_limit: usize,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_heartbeat_chain: 10,
            max_chain_duration: Duration::from_secs(300),
            first_message_attempts: 10,
            verify_first_message: true,
            memory_warning_threshold: 0.75,
            auto_summarize: false,
            summarize_fraction: 0.75,
            include_char_count: true,
            boot_messages: true,
            persona_char_limit: memloop_core::memory::DEFAULT_BLOCK_LIMIT,
            human_char_limit: memloop_core::memory::DEFAULT_BLOCK_LIMIT,
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_heartbeat_chain: config.agent.max_heartbeat_chain,
            max_chain_duration: config.agent.max_chain_duration(),
            first_message_attempts: config.agent.first_message_attempts,
            verify_first_message: config.agent.verify_first_message,
            memory_warning_threshold: config.agent.memory_warning_threshold,
            auto_summarize: config.agent.auto_summarize,
            summarize_fraction: config.agent.summarize_fraction,
            include_char_count: config.agent.include_char_count,
            boot_messages: config.agent.boot_messages,
            persona_char_limit: config.memory.persona_char_limit,
            human_char_limit: config.memory.human_char_limit,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// The collaborators an agent runs against.
#[derive(Clone)]
pub struct AgentDeps {
    pub provider: Arc<dyn Provider>,
    pub catalog: Arc<FunctionCatalog>,
    pub interface: Arc<dyn AgentInterface>,
    pub presentation: Presentation,
    pub message_store: Arc<dyn MessageStore>,
    pub archival_store: Arc<dyn ArchivalStore>,
    pub agent_store: Arc<dyn AgentStore>,
}

impl AgentDeps {
    /// Full presentation and a fresh in-memory store for everything.
    pub fn new(
        provider: Arc<dyn Provider>,
        catalog: Arc<FunctionCatalog>,
        interface: Arc<dyn AgentInterface>,
    ) -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            provider,
            catalog,
            interface,
            presentation: Presentation::Full,
            message_store: store.clone(),
            archival_store: store.clone(),
            agent_store: store,
        }
    }

    pub fn with_stores(
        mut self,
        messages: Arc<dyn MessageStore>,
        archival: Arc<dyn ArchivalStore>,
        agents: Arc<dyn AgentStore>,
    ) -> Self {
        self.message_store = messages;
        self.archival_store = archival;
        self.agent_store = agents;
        self
    }

    pub fn with_presentation(mut self, presentation: Presentation) -> Self {
        self.presentation = presentation;
        self
    }
}

/// What a step is fed.
#[derive(Debug, Clone, PartialEq)]
pub enum StepInput {
    /// Text typed by the user; wrapped in a `user_message` event
    User(String),
    /// A synthetic system event, passed through verbatim
    Event(String),
    /// No new input; the model continues from the current context
    Continue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOptions {
    /// This is the agent's first reply and may be verified
    pub first_message: bool,
    pub skip_verify: bool,
}

/// Result of one MODEL_CALL cycle.
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    /// Input, assistant reply and function results, in commit order
    pub new_messages: Vec<Message>,
    pub heartbeat_requested: bool,
    pub function_failed: bool,
    pub token_warning: bool,
    pub usage: Option<Usage>,
    /// Reported or estimated size of the context after the step
    pub context_tokens: usize,
}

/// Result of a self-driving [`Agent::run`].
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub steps: u32,
    pub continuations: u32,
    /// The chain hit its length or time bound
    pub truncated: bool,
    pub new_messages: Vec<Message>,
    pub usage: Usage,
    pub summarized: Option<SummaryReport>,
    /// A timed heartbeat was skipped because heartbeats are paused
    pub paused: bool,
}

struct Dispatch {
    ok: bool,
    message: Option<String>,
    heartbeat: bool,
}

impl Dispatch {
    fn failed(message: String) -> Self {
        Self {
            ok: false,
            message: Some(message),
            heartbeat: false,
        }
    }
}

/// One agent.
pub struct Agent {
    state: AgentState,
    system: String,
    registry: FunctionRegistry,
    memory: CoreMemory,
    memory_edited_at: DateTime<Utc>,
    heartbeat: HeartbeatState,
    messages: Vec<Message>,
    archival: ArchivalMemory,
    recall: RecallMemory,
    provider: Arc<dyn Provider>,
    agent_store: Arc<dyn AgentStore>,
    interface: Arc<dyn AgentInterface>,
    presentation: Presentation,
    settings: AgentSettings,
    alerted_memory_pressure: bool,
    first_message_pending: bool,
    cancel: CancellationToken,
}

impl Agent {
    /// Create a new agent from a preset and persist its opening messages.
    pub async fn create(
        name: impl Into<String>,
        user_id: Uuid,
        preset: &Preset,
        llm_config: LlmConfig,
        embedding_config: EmbeddingConfig,
        settings: AgentSettings,
        deps: AgentDeps,
    ) -> Result<Self> {
        let registry = FunctionRegistry::link(&preset.functions_schema, &deps.catalog)?;
        let memory = CoreMemory::with_values(
            &preset.persona,
            &preset.human,
            settings.persona_char_limit,
            settings.human_char_limit,
        )?;
        let state = AgentState::new(
            name,
            user_id,
            &preset.persona_name,
            &preset.human_name,
            &preset.name,
            llm_config,
            embedding_config,
        );

        let mut agent =
            Self::assemble(state, preset.system.clone(), registry, memory, settings, deps).await;
        agent.initialize_messages().await?;
        agent.update_state();
        info!(
            agent = %agent.state.name,
            id = %agent.state.id,
            preset = %preset.name,
            functions = agent.registry.len(),
            "Agent created"
        );
        Ok(agent)
    }

    /// Restore an agent from a checkpoint.
    ///
    /// Message ids that can't be found in recall storage are skipped with a
    /// warning. A checkpoint without messages gets a fresh opening sequence.
    pub async fn load(state: AgentState, settings: AgentSettings, deps: AgentDeps) -> Result<Self> {
        let registry = FunctionRegistry::link(&state.state.functions, &deps.catalog)?;
        let memory = CoreMemory::with_values(
            &state.state.persona,
            &state.state.human,
            settings.persona_char_limit,
            settings.human_char_limit,
        )?;
        let system = state.state.system.clone();
        let ids = state.state.messages.clone();

        let mut agent = Self::assemble(state, system, registry, memory, settings, deps).await;
        for id in &ids {
            match agent.recall.get(id).await? {
                Some(message) => agent.messages.push(message),
                None => warn!(agent = %agent.state.name, message = %id, "Checkpointed message missing from recall, skipping"),
            }
        }

        if let Some(edited) = agent
            .messages
            .first()
            .filter(|m| m.role == Role::System)
            .and_then(|m| parse_edit_timestamp(&m.content))
        {
            agent.memory_edited_at = edited;
        }
        match agent.messages.first().map(|m| m.role) {
            None => agent.initialize_messages().await?,
            Some(Role::System) => agent.refresh_system_message().await,
            Some(_) => {
                warn!(agent = %agent.state.name, "Checkpoint has no system message, rebuilding it");
                let system = agent.stamp(Message::system(agent.render_system(&agent.memory)));
                agent.recall.append_all(std::slice::from_ref(&system)).await?;
                agent.messages.insert(0, system);
            }
        }
        agent.update_state();
        info!(
            agent = %agent.state.name,
            messages = agent.messages.len(),
            drift = agent.registry.drift().len(),
            "Agent loaded"
        );
        Ok(agent)
    }

    /// Load `name` for `user_id` from the agent store, if it exists.
    pub async fn restore(
        name: &str,
        user_id: Uuid,
        settings: AgentSettings,
        deps: AgentDeps,
    ) -> Result<Option<Self>> {
        match deps.agent_store.get_agent_state(name, user_id).await? {
            Some(state) => Ok(Some(Self::load(state, settings, deps).await?)),
            None => Ok(None),
        }
    }

    async fn assemble(
        state: AgentState,
        system: String,
        registry: FunctionRegistry,
        memory: CoreMemory,
        settings: AgentSettings,
        deps: AgentDeps,
    ) -> Self {
        let archival = ArchivalMemory::open(deps.archival_store.clone(), state.id, state.user_id).await;
        let recall = RecallMemory::open(deps.message_store.clone(), state.id).await;
        Self {
            state,
            system,
            registry,
            memory,
            memory_edited_at: Utc::now(),
            heartbeat: HeartbeatState::default(),
            messages: Vec::new(),
            archival,
            recall,
            provider: deps.provider,
            agent_store: deps.agent_store,
            interface: deps.interface,
            presentation: deps.presentation,
            settings,
            alerted_memory_pressure: false,
            first_message_pending: false,
            cancel: CancellationToken::new(),
        }
    }

    async fn initialize_messages(&mut self) -> Result<()> {
        let now = Utc::now();
        let messages: Vec<Message> = MessageSequenceBuilder::new(&self.system, &self.memory)
            .with_char_count(self.settings.include_char_count)
            .with_boot_messages(self.settings.boot_messages)
            .initial_sequence(&self.memory_edited_at, self.recall.count(), self.archival.count(), now)
            .into_iter()
            .map(|m| self.stamp(m))
            .collect();
        self.recall.append_all(&messages).await?;
        self.messages = messages;
        self.first_message_pending = true;
        Ok(())
    }

    fn stamp(&self, message: Message) -> Message {
        message.owned_by(
            self.state.id,
            self.state.user_id,
            Some(&self.state.llm_config.model),
        )
    }

    fn render_system(&self, memory: &CoreMemory) -> String {
        render_system_with_memory(
            &self.system,
            memory,
            &format_timestamp(&self.memory_edited_at),
            self.recall.count(),
            self.archival.count(),
            self.settings.include_char_count,
        )
    }

    /// Re-render the system message; persist it if it changed.
    async fn refresh_system_message(&mut self) {
        let rendered = self.render_system(&self.memory);
        let Some(first) = self.messages.first_mut() else {
            return;
        };
        if first.role != Role::System || first.content == rendered {
            return;
        }
        first.content = rendered;
        if let Err(e) = self.recall.update(first).await {
            warn!(agent = %self.state.name, error = %e, "Failed to persist refreshed system message");
        }
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn id(&self) -> Uuid {
        self.state.id
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// The last checkpoint produced by [`Self::update_state`].
    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn memory(&self) -> &CoreMemory {
        &self.memory
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn heartbeat_state(&self) -> &HeartbeatState {
        &self.heartbeat
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn archival(&self) -> &ArchivalMemory {
        &self.archival
    }

    pub fn recall(&self) -> &RecallMemory {
        &self.recall
    }

    /// Cancelling this token aborts the in-flight step.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Replace a spent token so the agent can run again after a cancel.
    pub fn renew_cancellation(&mut self) -> CancellationToken {
        self.cancel = CancellationToken::new();
        self.cancel.clone()
    }

    /// Estimated size of the in-context messages plus function schemas.
    pub fn context_tokens(&self) -> usize {
        estimate_messages_tokens(&self.messages) + estimate_schema_tokens(self.registry.schemas())
    }

    /// Recompute the checkpoint from live fields.
    pub fn update_state(&mut self) -> &AgentState {
        self.state = AgentState {
            state: StateBag {
                persona: self.memory.persona().value().to_string(),
                human: self.memory.human().value().to_string(),
                system: self.system.clone(),
                functions: self.registry.schemas().to_vec(),
                messages: self.messages.iter().map(|m| m.id.clone()).collect(),
            },
            ..self.state.clone()
        };
        &self.state
    }

    // ── Model calls ─────────────────────────────────────────────────────

    fn request(&self, messages: Vec<Message>) -> ProviderRequest {
        let mut request = ProviderRequest::new(
            &self.state.llm_config.model,
            messages,
            self.registry.schemas().to_vec(),
        );
        request.temperature = self.settings.temperature;
        request.max_tokens = self.settings.max_tokens;
        request
    }

    /// One model call, raced against cancellation.
    async fn call_model(&self, request: ProviderRequest) -> Result<ProviderResponse> {
        if self.cancel.is_cancelled() {
            return Err(AgentError::Cancelled.into());
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(AgentError::Cancelled.into()),
            result = self.send(request) => Ok(result?),
        }
    }

    async fn send(&self, mut request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError> {
        let consumer = match &self.presentation {
            Presentation::Full => return self.provider.complete(request).await,
            Presentation::Incremental(consumer) => consumer.clone(),
        };
        request.stream = true;
        let model = request.model.clone();
        let mut rx = self.provider.stream(request).await?;

        consumer.stream_start();
        let assembled = collect_stream(&mut rx, consumer.as_ref()).await;
        consumer.stream_end();
        let (content, tool_calls, usage) = assembled?;

        Ok(ProviderResponse {
            message: Message::assistant(content).with_tool_calls(tool_calls),
            usage,
            model,
        })
    }

    /// Call the model, re-asking while a verified first reply doesn't
    /// carry exactly one function call.
    async fn model_turn(&self, context: &[Message], verify: bool) -> Result<ProviderResponse> {
        let attempts = if verify {
            self.settings.first_message_attempts.max(1)
        } else {
            1
        };
        for attempt in 1..=attempts {
            let response = self.call_model(self.request(context.to_vec())).await?;
            if !verify || response.message.tool_calls.len() == 1 {
                return Ok(response);
            }
            warn!(
                agent = %self.state.name,
                attempt,
                calls = response.message.tool_calls.len(),
                "First message failed verification, retrying"
            );
        }
        Err(AgentError::FirstMessageVerification { attempts }.into())
    }

    async fn dispatch(&self, raw: &MessageToolCall, ctx: &mut FunctionContext<'_>) -> Dispatch {
        let Some(binding) = self.registry.get(&raw.name) else {
            warn!(agent = %self.state.name, function = %raw.name, "Model called an unknown function");
            return Dispatch::failed(ToolError::NotFound(raw.name.clone()).to_string());
        };
        let mut call = match ToolCall::parse(raw) {
            Ok(call) => call,
            Err(e) => {
                warn!(agent = %self.state.name, function = %raw.name, error = %e, "Unparseable function arguments");
                return Dispatch::failed(e.to_string());
            }
        };
        let heartbeat = call.take_heartbeat_request();

        debug!(agent = %self.state.name, function = %raw.name, heartbeat, "Calling function");
        match binding.callable.call(ctx, &call).await {
            Ok(message) => Dispatch {
                ok: true,
                message,
                heartbeat,
            },
            Err(e) => {
                warn!(agent = %self.state.name, function = %raw.name, error = %e, "Function failed");
                Dispatch::failed(format!("Error calling function {}: {e}", raw.name))
            }
        }
    }

    // ── Stepping ────────────────────────────────────────────────────────

    /// One MODEL_CALL cycle: append the input, call the model, run the
    /// requested functions and commit the result.
    pub async fn step(&mut self, input: StepInput, options: StepOptions) -> Result<StepOutcome> {
        let now = Utc::now();
        let mut pending: Vec<Message> = Vec::new();
        match &input {
            StepInput::User(text) => {
                let message = self.stamp(Message::user(system::user_message(text, now)));
                self.interface.user_message(text, Some(&message));
                pending.push(message);
            }
            StepInput::Event(event) => {
                let message = self.stamp(Message::user(event.clone()));
                self.interface.user_message(event, Some(&message));
                pending.push(message);
            }
            StepInput::Continue => {}
        }

        let mut context = self.messages.clone();
        match context.first_mut() {
            Some(first) if first.role == Role::System => first.content = self.render_system(&self.memory),
            _ => return Err(AgentError::EmptyContext.into()),
        }
        context.extend(pending.iter().cloned());

        let verify = options.first_message && !options.skip_verify;
        let response = self.model_turn(&context, verify).await?;
        let usage = response.usage.clone();

        let assistant = self.stamp(response.message);
        if !assistant.content.is_empty() {
            self.interface.internal_monologue(&assistant.content, Some(&assistant));
        }
        let tool_calls = assistant.tool_calls.clone();
        pending.push(assistant);

        // Staged copies; committed only after the whole batch is resolved.
        let mut memory = self.memory.clone();
        let mut heartbeat = self.heartbeat.clone();
        let mut heartbeat_requested = false;
        let mut function_failed = false;
        {
            let mut ctx = FunctionContext {
                agent_id: self.state.id,
                user_id: self.state.user_id,
                memory: &mut memory,
                heartbeat: &mut heartbeat,
                archival: &self.archival,
                recall: &self.recall,
                interface: self.interface.as_ref(),
                now,
            };
            for raw in &tool_calls {
                self.interface
                    .function_message(&format!("Running {}({})", raw.name, raw.arguments), None);
                let outcome = self.dispatch(raw, &mut ctx).await;
                heartbeat_requested |= outcome.ok && outcome.heartbeat;
                function_failed |= !outcome.ok;

                let result = self.stamp(Message::tool_result(
                    raw.id.clone(),
                    raw.name.clone(),
                    system::package_function_response(outcome.ok, outcome.message.as_deref(), now),
                ));
                let summary = if outcome.ok {
                    format!("Ran {}({})", raw.name, raw.arguments)
                } else {
                    format!("Error: {}", outcome.message.as_deref().unwrap_or("function failed"))
                };
                self.interface.function_message(&summary, Some(&result));
                pending.push(result);
            }
        }

        let context_tokens = match usage.as_ref().map(|u| u.total_tokens as usize) {
            Some(reported) if reported > 0 => reported,
            _ => {
                estimate_messages_tokens(&self.messages)
                    + estimate_messages_tokens(&pending)
                    + estimate_schema_tokens(self.registry.schemas())
            }
        };
        let warning_level =
            self.state.llm_config.context_window as f32 * self.settings.memory_warning_threshold;
        let token_warning = context_tokens as f32 > warning_level;
        if token_warning {
            warn!(agent = %self.state.name, context_tokens, warning_level, "Context is close to the window limit");
        }

        // Commit
        self.recall.append_all(&pending).await?;
        self.messages.extend(pending.iter().cloned());
        if memory != self.memory {
            self.memory = memory;
            self.memory_edited_at = now;
            debug!(agent = %self.state.name, "Core memory edited");
        }
        self.heartbeat = heartbeat;
        self.first_message_pending = false;
        self.refresh_system_message().await;
        self.update_state();

        debug!(
            agent = %self.state.name,
            new_messages = pending.len(),
            heartbeat_requested,
            function_failed,
            token_warning,
            "Step complete"
        );
        Ok(StepOutcome {
            new_messages: pending,
            heartbeat_requested,
            function_failed,
            token_warning,
            usage,
            context_tokens,
        })
    }

    /// Step until the agent hands control back to the user.
    ///
    /// Follow-up events (memory pressure, function failure, requested
    /// heartbeat) are fed back in, bounded by `max_heartbeat_chain`
    /// continuations and `max_chain_duration`.
    pub async fn run(&mut self, input: StepInput) -> Result<RunOutcome> {
        let started = tokio::time::Instant::now();
        let mut outcome = RunOutcome::default();
        let mut next = input;

        loop {
            let options = StepOptions {
                first_message: self.first_message_pending,
                skip_verify: !self.settings.verify_first_message,
            };
            let step = self.step(next, options).await?;
            outcome.steps += 1;
            if let Some(usage) = &step.usage {
                outcome.usage.prompt_tokens += usage.prompt_tokens;
                outcome.usage.completion_tokens += usage.completion_tokens;
                outcome.usage.total_tokens += usage.total_tokens;
            }
            outcome.new_messages.extend(step.new_messages);

            let now = Utc::now();
            let mut follow_up = None;
            if step.token_warning {
                if self.settings.auto_summarize {
                    outcome.summarized = Some(self.auto_summarize().await?);
                } else if !self.alerted_memory_pressure {
                    self.alerted_memory_pressure = true;
                    follow_up = Some(system::memory_pressure_warning(now));
                }
            }
            if follow_up.is_none() {
                if step.function_failed {
                    follow_up = Some(system::function_failed(now));
                } else if step.heartbeat_requested {
                    follow_up = Some(system::heartbeat_requested(now));
                }
            }
            let Some(event) = follow_up else {
                break;
            };

            let chain_full = outcome.continuations >= self.settings.max_heartbeat_chain;
            if chain_full || started.elapsed() >= self.settings.max_chain_duration {
                warn!(
                    agent = %self.state.name,
                    continuations = outcome.continuations,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Heartbeat chain truncated"
                );
                let note = self.stamp(Message::user(system::chain_truncated(outcome.continuations, now)));
                self.recall.append_all(std::slice::from_ref(&note)).await?;
                self.messages.push(note.clone());
                self.update_state();
                outcome.new_messages.push(note);
                outcome.truncated = true;
                break;
            }

            outcome.continuations += 1;
            next = StepInput::Event(event);
        }
        Ok(outcome)
    }

    async fn auto_summarize(&mut self) -> Result<SummaryReport> {
        match self.summarize(Condensation::Model).await {
            Err(Error::Provider(e)) => {
                warn!(agent = %self.state.name, error = %e, "Model summary failed, falling back to an excerpt");
                self.summarize(Condensation::Excerpt).await
            }
            other => other,
        }
    }

    // ── Summarization ───────────────────────────────────────────────────

    /// Evict old messages until the context is under
    /// `context_window × memory_warning_threshold × summarize_fraction`.
    pub async fn summarize(&mut self, condensation: Condensation) -> Result<SummaryReport> {
        let target = self.state.llm_config.context_window as f32
            * self.settings.memory_warning_threshold
            * self.settings.summarize_fraction;
        self.summarize_to(target as usize, condensation).await
    }

    /// Evict the oldest messages until [`Self::context_tokens`] is below
    /// `target_tokens`, replacing them with a summary note.
    ///
    /// Function calls are never split from their results and the most
    /// recent exchange always stays. Evicted messages remain in recall.
    pub async fn summarize_to(
        &mut self,
        target_tokens: usize,
        condensation: Condensation,
    ) -> Result<SummaryReport> {
        let tokens_before = self.context_tokens();
        let boundaries = eviction_boundaries(&self.messages);
        let Some(&last_boundary) = boundaries.last() else {
            info!(agent = %self.state.name, "Nothing to summarize");
            return Ok(SummaryReport {
                evicted: 0,
                tokens_before,
                tokens_after: tokens_before,
                summary: String::new(),
            });
        };

        let now = Utc::now();
        let total = self.recall.count().max(self.messages.len());
        let reserve = match condensation {
            Condensation::Model => SUMMARY_MAX_TOKENS as usize * 4,
            Condensation::Excerpt => EXCERPT_CHARS,
        };
        let note_tokens = estimate_message_tokens(&Message::user(system::summary_note(
            &"x".repeat(reserve),
            total,
            total,
            now,
        )));
        let schema_tokens = estimate_schema_tokens(self.registry.schemas());
        let kept_tokens = |cut: usize| -> usize {
            estimate_message_tokens(&self.messages[0])
                + self.messages[1..cut]
                    .iter()
                    .filter(|m| m.pinned)
                    .map(estimate_message_tokens)
                    .sum::<usize>()
                + estimate_messages_tokens(&self.messages[cut..])
        };

        let cut = match boundaries
            .iter()
            .copied()
            .find(|&k| kept_tokens(k) + note_tokens + schema_tokens < target_tokens)
        {
            Some(cut) => cut,
            None => {
                warn!(
                    agent = %self.state.name,
                    target_tokens,
                    "Cannot reach the summarization target, evicting as much as possible"
                );
                last_boundary
            }
        };

        let evicted: Vec<Message> = self.messages[1..cut]
            .iter()
            .filter(|m| !m.pinned)
            .cloned()
            .collect();
        let summary = match condensation {
            Condensation::Excerpt => excerpt(&evicted),
            Condensation::Model => truncate_chars(&self.condense_with_model(&evicted).await?, reserve),
        };

        let remaining = self.messages.len() - evicted.len();
        let note = self.stamp(Message::user(system::summary_note(
            &summary,
            total.saturating_sub(remaining),
            total,
            now,
        )));
        self.recall.append_all(std::slice::from_ref(&note)).await?;

        let mut kept = Vec::with_capacity(remaining + 1);
        kept.push(self.messages[0].clone());
        kept.push(note);
        kept.extend(self.messages[1..cut].iter().filter(|m| m.pinned).cloned());
        kept.extend(self.messages[cut..].iter().cloned());
        self.messages = kept;
        self.alerted_memory_pressure = false;
        self.refresh_system_message().await;
        self.update_state();

        let tokens_after = self.context_tokens();
        info!(
            agent = %self.state.name,
            evicted = evicted.len(),
            tokens_before,
            tokens_after,
            "Context summarized"
        );
        Ok(SummaryReport {
            evicted: evicted.len(),
            tokens_before,
            tokens_after,
            summary,
        })
    }

    async fn condense_with_model(&self, evicted: &[Message]) -> Result<String> {
        let mut request = ProviderRequest::new(
            &self.state.llm_config.model,
            vec![Message::system(SUMMARY_SYSTEM_PROMPT), Message::user(transcript(evicted))],
            Vec::new(),
        );
        request.function_call = FunctionCallMode::None;
        request.max_tokens = Some(SUMMARY_MAX_TOKENS);
        request.temperature = self.settings.temperature;

        if self.cancel.is_cancelled() {
            return Err(AgentError::Cancelled.into());
        }
        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(AgentError::Cancelled.into()),
            result = self.provider.complete(request) => result?,
        };
        Ok(response.message.content.trim().to_string())
    }

    // ── Operator commands ───────────────────────────────────────────────

    /// Remove the last `n` messages from the context (never the system
    /// message). A function call is popped together with its results.
    /// Popped messages stay in recall.
    pub fn pop_messages(&mut self, n: usize) -> Result<Vec<Message>> {
        if self.messages.len() <= 1 {
            return Err(AgentError::EmptyContext.into());
        }
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut cut = self.messages.len() - n.min(self.messages.len() - 1);
        while cut > 1 && self.messages[cut].role == Role::Tool {
            cut -= 1;
        }
        let popped = self.messages.split_off(cut);
        self.update_state();
        info!(agent = %self.state.name, popped = popped.len(), "Popped messages");
        Ok(popped)
    }

    /// Drop everything after the last user message and ask the model again.
    ///
    /// If the new reply fails or is cancelled the previous one is put back.
    pub async fn retry_last(&mut self) -> Result<RunOutcome> {
        let last_user = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::User)
            .filter(|&i| i > 0)
            .ok_or(AgentError::EmptyContext)?;
        let snapshot = self.messages.clone();
        let dropped = self.messages.split_off(last_user + 1);
        let memory = self.memory.clone();
        let memory_edited_at = self.memory_edited_at;
        info!(agent = %self.state.name, dropped = dropped.len(), "Retrying last reply");

        match self.run(StepInput::Continue).await {
            Ok(outcome) => {
                self.update_state();
                Ok(outcome)
            }
            Err(e) => {
                warn!(agent = %self.state.name, error = %e, "Retry failed, restoring previous reply");
                self.messages = snapshot;
                self.memory = memory;
                self.memory_edited_at = memory_edited_at;
                self.update_state();
                Err(e)
            }
        }
    }

    /// Replace the inner monologue of the last assistant message.
    pub async fn rethink(&mut self, text: &str) -> Result<()> {
        let message = self
            .messages
            .iter_mut()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .ok_or_else(|| AgentError::NothingToRewrite("no assistant message in context".into()))?;
        message.content = text.to_string();
        self.recall.update(message).await?;
        self.interface.internal_monologue(text, Some(&*message));
        self.update_state();
        Ok(())
    }

    /// Replace what the agent last said through `send_message`.
    pub async fn rewrite(&mut self, text: &str) -> Result<()> {
        let (message, index) = self
            .messages
            .iter_mut()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .find_map(|m| {
                let index = m.tool_calls.iter().position(|c| c.name == "send_message")?;
                Some((m, index))
            })
            .ok_or_else(|| AgentError::NothingToRewrite("no send_message call in context".into()))?;

        let call = &mut message.tool_calls[index];
        let mut args = serde_json::from_str::<serde_json::Value>(&call.arguments)
            .ok()
            .filter(|v| v.is_object())
            .unwrap_or_else(|| serde_json::json!({}));
        args["message"] = serde_json::Value::String(text.to_string());
        call.arguments = args.to_string();

        self.recall.update(message).await?;
        self.interface.assistant_message(text, Some(&*message));
        self.update_state();
        Ok(())
    }

    /// Run the agent on a manual heartbeat event. Manual heartbeats ignore
    /// any pause set with `pause_heartbeats`.
    pub async fn heartbeat(&mut self) -> Result<RunOutcome> {
        self.run(StepInput::Event(system::manual_heartbeat(Utc::now())))
            .await
    }

    /// Whether timed heartbeats are currently paused.
    pub fn heartbeats_paused(&self) -> bool {
        self.heartbeat.is_paused(Utc::now())
    }

    /// Run the agent on a timed heartbeat, unless it paused heartbeats.
    /// An expired pause is cleared.
    pub async fn timed_heartbeat(&mut self) -> Result<RunOutcome> {
        let now = Utc::now();
        if self.heartbeat.is_paused(now) {
            debug!(
                agent = %self.state.name,
                pause_minutes = self.heartbeat.pause_minutes,
                "Heartbeats paused, skipping"
            );
            return Ok(RunOutcome {
                paused: true,
                ..RunOutcome::default()
            });
        }
        if self.heartbeat.pause_until.is_some() {
            self.heartbeat.resume();
        }
        self.run(StepInput::Event(system::timed_heartbeat(now))).await
    }

    /// Send the memory-pressure warning now.
    pub async fn memory_warning(&mut self) -> Result<RunOutcome> {
        self.alerted_memory_pressure = true;
        self.run(StepInput::Event(system::memory_pressure_warning(Utc::now())))
            .await
    }

    /// Persist the in-context messages and the checkpoint.
    pub async fn save(&mut self) -> Result<()> {
        self.update_state();
        self.recall.append_all(&self.messages).await?;
        self.agent_store.save_agent_state(&self.state).await?;
        info!(agent = %self.state.name, messages = self.messages.len(), "Agent saved");
        Ok(())
    }

    /// The last `n` in-context messages.
    pub fn dump(&self, n: usize) -> &[Message] {
        &self.messages[self.messages.len().saturating_sub(n)..]
    }
}

/// Drain a chunk stream, forwarding every chunk to `consumer`.
async fn collect_stream(
    rx: &mut mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
    consumer: &dyn ChunkConsumer,
) -> std::result::Result<(String, Vec<MessageToolCall>, Option<Usage>), ProviderError> {
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    let mut usage = None;
    while let Some(chunk) = rx.recv().await {
        let chunk = chunk?;
        consumer.process_chunk(&chunk);
        if let Some(text) = &chunk.content {
            content.push_str(text);
        }
        tool_calls.extend(chunk.tool_calls.iter().cloned());
        if chunk.usage.is_some() {
            usage = chunk.usage.clone();
        }
        if chunk.done {
            break;
        }
    }
    Ok((content, tool_calls, usage))
}
