//! Coordinator-led multi-agent group.
//!
//! An [`AgentGroup`] owns a set of specialist [`Agent`]s, at most one
//! [`CoordinatorAgent`], a shared [`ResponseCache`] and the
//! [`CompletionClient`] they all call. Its main operation,
//! [`run_collective`](AgentGroup::run_collective), runs the three-phase
//! protocol and streams [`OrchestrationEvent`]s as it goes.
//!
//! # Protocol
//!
//! ```text
//! Init → Analyzing → FanningOut → Synthesizing → Complete
//!           │                          │
//!           └──────► Failed ◄──────────┘
//! ```
//!
//! 1. **Analyzing**: the coordinator decides which roles should answer. Its
//!    analysis is advisory and passed through as text; every specialist is
//!    asked regardless. Failure here ends the run.
//! 2. **FanningOut**: the user input is appended to every specialist's
//!    transcript and each one is asked through the cache. A failing specialist
//!    is logged and left out of all aggregates; the run continues.
//! 3. **Synthesizing**: the coordinator merges the collected answers. Failure
//!    here ends the run but keeps the partial answers in the event.
//!
//! # Fan-out modes
//!
//! - [`FanOutMode::Sequential`]: one specialist at a time, events in registration order.
//! - [`FanOutMode::Concurrent`]: all specialists at once, events in completion order.
//!
//! Either way synthesis only starts once every specialist call has finished.
//!
//! # Example
//!
//! ```rust,no_run
//! use conclave::clients::openrouter::OpenRouterClient;
//! use conclave::{Agent, AgentGroup, AgentRole, CoordinatorAgent, OrchestrationEvent};
//! use futures_util::StreamExt;
//! use std::sync::Arc;
//!
//! # async {
//! let client = Arc::new(OpenRouterClient::new("key"));
//! let mut group = AgentGroup::new(client);
//! group.add_agent(CoordinatorAgent::new("Coordinator", "openai/gpt-4o", "You coordinate."));
//! group.add_agent(Agent::new("Coder", AgentRole::Coder, "openai/gpt-4o-mini", "You write code."));
//!
//! let mut run = group.run_collective("Write a binary search in Rust");
//! while let Some(event) = run.next().await {
//!     if let OrchestrationEvent::CompletePhase { final_synthesis, .. } = &event {
//!         println!("{}", final_synthesis);
//!     }
//! }
//! # };
//! ```

use crate::client_wrapper::{
    Completion, CompletionClient, CompletionError, Role, DEFAULT_TEMPERATURE,
};
use crate::conclave::agent::{Agent, Analysis, CoordinatorAgent, Participant};
use crate::conclave::cache::{CacheKey, CacheStatus, ResponseCache};
use crate::conclave::config::ConclaveConfig;
use crate::conclave::event::{
    AgentReply, FailureStage, OrchestrationEvent, CANCELLED, NO_COORDINATOR,
};
use futures_util::stream::Stream;
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

type SharedAgent = Arc<Mutex<Agent>>;
type SharedCoordinator = Arc<Mutex<CoordinatorAgent>>;

/// How specialists are called during the fan-out phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FanOutMode {
    /// One at a time in registration order. `AgentPhase` events follow registration order.
    #[default]
    Sequential,
    /// All at once. `AgentPhase` events follow completion order.
    Concurrent,
}

/// Errors returned by direct (non-streaming) group calls.
///
/// ```
/// use conclave::GroupError;
///
/// let err = GroupError::AgentNotFound("Critic".into());
/// assert_eq!(err.to_string(), "Agent not found: Critic");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GroupError {
    /// No specialist is registered under this name.
    AgentNotFound(String),
    /// The completion call failed.
    Completion(CompletionError),
}

impl fmt::Display for GroupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupError::AgentNotFound(name) => write!(f, "Agent not found: {}", name),
            GroupError::Completion(err) => write!(f, "{}", err),
        }
    }
}

impl Error for GroupError {}

impl From<CompletionError> for GroupError {
    fn from(err: CompletionError) -> Self {
        GroupError::Completion(err)
    }
}

pub struct AgentGroup {
    client: Arc<dyn CompletionClient>,
    /// Specialists keyed by name.
    agents: HashMap<String, SharedAgent>,
    /// Specialist names in registration order; drives sequential fan-out.
    agent_order: Vec<String>,
    coordinator: Option<SharedCoordinator>,
    cache: Arc<ResponseCache>,
    temperature: f32,
    fan_out: FanOutMode,
    event_buffer: usize,
}

impl AgentGroup {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            agents: HashMap::new(),
            agent_order: Vec::new(),
            coordinator: None,
            cache: Arc::new(ResponseCache::new()),
            temperature: DEFAULT_TEMPERATURE,
            fan_out: FanOutMode::Sequential,
            event_buffer: 16,
        }
    }

    /// Group with the temperature, fan-out mode and event buffer of `config`.
    pub fn from_config(client: Arc<dyn CompletionClient>, config: &ConclaveConfig) -> Self {
        Self::new(client)
            .with_temperature(config.temperature)
            .with_fan_out(config.fan_out)
            .with_event_buffer(config.event_buffer)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_fan_out(mut self, fan_out: FanOutMode) -> Self {
        self.fan_out = fan_out;
        self
    }

    /// Capacity of the channel between a run and its consumer (minimum 1).
    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer.max(1);
        self
    }

    pub fn fan_out(&self) -> FanOutMode {
        self.fan_out
    }

    /// Register a specialist or the coordinator.
    ///
    /// A coordinator replaces the current one. A specialist replaces any
    /// specialist with the same name without complaint and keeps that name's
    /// original position in the fan-out order.
    pub fn add_agent(&mut self, participant: impl Into<Participant>) {
        match participant.into() {
            Participant::Coordinator(coordinator) => {
                log::debug!(
                    "conclave::group: coordinator set to '{}' ({})",
                    coordinator.name(),
                    coordinator.agent().model
                );
                self.coordinator = Some(Arc::new(Mutex::new(coordinator)));
            }
            Participant::Specialist(agent) => {
                let name = agent.name.clone();
                log::debug!(
                    "conclave::group: registered '{}' ({}, {})",
                    name,
                    agent.role,
                    agent.model
                );
                if !self.agents.contains_key(&name) {
                    self.agent_order.push(name.clone());
                }
                self.agents.insert(name, Arc::new(Mutex::new(agent)));
            }
        }
    }

    /// Remove a specialist. Returns `false` when no such specialist exists.
    pub fn remove_agent(&mut self, name: &str) -> bool {
        self.agent_order.retain(|registered| registered != name);
        self.agents.remove(name).is_some()
    }

    /// Specialist names in registration order.
    pub fn agent_names(&self) -> Vec<String> {
        self.agent_order.clone()
    }

    pub fn len(&self) -> usize {
        self.agent_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agent_order.is_empty()
    }

    pub fn has_coordinator(&self) -> bool {
        self.coordinator.is_some()
    }

    /// Copy of a specialist's current state.
    pub async fn agent(&self, name: &str) -> Option<Agent> {
        let agent = self.agents.get(name)?;
        let agent = agent.lock().await;
        Some(agent.clone())
    }

    /// Copy of the coordinator's current state.
    pub async fn coordinator(&self) -> Option<CoordinatorAgent> {
        let coordinator = self.coordinator.as_ref()?;
        let coordinator = coordinator.lock().await;
        Some(coordinator.clone())
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Ask one specialist to answer its current transcript, through the cache.
    ///
    /// A cached result is returned as stored, including its original elapsed
    /// time. The reply is not appended to the transcript.
    pub async fn get_response(&self, name: &str) -> Result<Completion, GroupError> {
        let agent = self
            .agents
            .get(name)
            .ok_or_else(|| GroupError::AgentNotFound(name.to_string()))?;
        let mut agent = agent.lock().await;
        let completion =
            cached_response(&self.cache, &mut agent, self.client.as_ref(), self.temperature)
                .await?;
        Ok(completion)
    }

    /// Single-agent turn: append `user_input`, get the response and append it
    /// to the transcript on success.
    pub async fn chat(&self, name: &str, user_input: &str) -> Result<Completion, GroupError> {
        let agent = self
            .agents
            .get(name)
            .ok_or_else(|| GroupError::AgentNotFound(name.to_string()))?;
        let mut agent = agent.lock().await;
        agent.append_message(Role::User, user_input);
        let completion =
            cached_response(&self.cache, &mut agent, self.client.as_ref(), self.temperature)
                .await?;
        agent.append_message(Role::Assistant, completion.text.clone());
        Ok(completion)
    }

    /// Start a new chat: every specialist and the coordinator go back to
    /// their system message. The cache is kept.
    pub async fn reset_conversations(&self) {
        for name in &self.agent_order {
            if let Some(agent) = self.agents.get(name) {
                agent.lock().await.reset();
            }
        }
        if let Some(coordinator) = &self.coordinator {
            coordinator.lock().await.agent_mut().reset();
        }
        log::info!(
            "conclave::group: conversations reset for {} specialists",
            self.agent_order.len()
        );
    }

    /// Run the analyze → fan-out → synthesize protocol for `user_input`.
    ///
    /// The run executes on a spawned Tokio task (so this must be called from
    /// within a runtime) and works on the agents registered at call time.
    /// Dropping the returned [`CollectiveRun`] cancels it.
    pub fn run_collective(&self, user_input: impl Into<String>) -> CollectiveRun {
        self.run_collective_with_cancel(user_input, CancellationToken::new())
    }

    /// Like [`run_collective`](AgentGroup::run_collective), but also stops
    /// when `cancel` is cancelled.
    ///
    /// Cancelling abandons the in-flight client call, makes no further calls
    /// and ends the stream with a `Failure` whose reason is [`CANCELLED`].
    pub fn run_collective_with_cancel(
        &self,
        user_input: impl Into<String>,
        cancel: CancellationToken,
    ) -> CollectiveRun {
        let cancel = cancel.child_token();
        let (sender, receiver) = mpsc::channel(self.event_buffer);
        let run = RunContext {
            run_id: Uuid::new_v4(),
            client: Arc::clone(&self.client),
            coordinator: self.coordinator.clone(),
            specialists: self
                .agent_order
                .iter()
                .filter_map(|name| {
                    self.agents
                        .get(name)
                        .map(|agent| (name.clone(), Arc::clone(agent)))
                })
                .collect(),
            cache: Arc::clone(&self.cache),
            temperature: self.temperature,
            fan_out: self.fan_out,
        };
        let run_id = run.run_id;

        tokio::spawn(run.drive(user_input.into(), sender, cancel.clone()));

        CollectiveRun {
            run_id,
            events: receiver,
            cancel,
        }
    }
}

/// Ask `agent` to answer its current transcript, memoized by `(name, transcript)`.
async fn cached_response(
    cache: &ResponseCache,
    agent: &mut Agent,
    client: &dyn CompletionClient,
    temperature: f32,
) -> Result<Completion, CompletionError> {
    let key = CacheKey::new(&agent.name, agent.transcript());
    let name = agent.name.clone();
    // not polled unless the slot is empty
    let call = agent.timed_completion(client, temperature);
    let (completion, status) = cache.get_or_try_insert_with(key, move || call).await?;
    if status == CacheStatus::Hit {
        log::debug!("conclave::group: cache hit for '{}'", name);
    }
    Ok(completion)
}

/// Event stream of one collective run.
///
/// Yields events until the terminal `CompletePhase` or `Failure`, then ends.
pub struct CollectiveRun {
    run_id: Uuid,
    events: mpsc::Receiver<OrchestrationEvent>,
    cancel: CancellationToken,
}

impl CollectiveRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Stop the run. The stream still delivers the resulting `Failure` event.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this run (and only this run).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn next_event(&mut self) -> Option<OrchestrationEvent> {
        self.events.recv().await
    }

    /// Drain the run to its end.
    pub async fn collect_events(mut self) -> Vec<OrchestrationEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        events
    }
}

impl Stream for CollectiveRun {
    type Item = OrchestrationEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for CollectiveRun {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// The consumer dropped its end of the event channel.
struct Disconnected;

/// Result of one specialist turn.
struct SpecialistOutcome {
    name: String,
    result: Result<Completion, CompletionError>,
    elapsed: Duration,
}

/// Running aggregates of the fan-out phase.
#[derive(Default)]
struct FanOutProgress {
    responses: Vec<AgentReply>,
    tokens: usize,
    timings: BTreeMap<String, Duration>,
}

impl FanOutProgress {
    /// Fold one specialist outcome in; failures are dropped and produce no event.
    fn absorb(
        &mut self,
        outcome: SpecialistOutcome,
        analysis: &str,
        coordinator_elapsed: Duration,
    ) -> Option<OrchestrationEvent> {
        let completion = match outcome.result {
            Ok(completion) => completion,
            Err(err) => {
                log::warn!(
                    "conclave::group: '{}' failed and is left out of this run: {}",
                    outcome.name,
                    err
                );
                return None;
            }
        };

        self.responses.push(AgentReply {
            agent: outcome.name.clone(),
            response: completion.text.clone(),
            elapsed: outcome.elapsed,
        });
        self.tokens += completion.tokens;
        self.timings.insert(outcome.name.clone(), outcome.elapsed);

        Some(OrchestrationEvent::AgentPhase {
            agent_name: outcome.name,
            response: completion.text,
            elapsed: outcome.elapsed,
            responses: self.responses.clone(),
            cumulative_tokens: self.tokens,
            per_agent_elapsed: self.timings.clone(),
            slowest_elapsed: self.slowest(coordinator_elapsed),
            coordinator_analysis: analysis.to_string(),
            coordinator_elapsed,
        })
    }

    fn slowest(&self, fallback: Duration) -> Duration {
        self.timings.values().max().copied().unwrap_or(fallback)
    }
}

/// Everything a run needs, detached from the group that started it.
struct RunContext {
    run_id: Uuid,
    client: Arc<dyn CompletionClient>,
    coordinator: Option<SharedCoordinator>,
    specialists: Vec<(String, SharedAgent)>,
    cache: Arc<ResponseCache>,
    temperature: f32,
    fan_out: FanOutMode,
}

impl RunContext {
    async fn drive(
        self,
        user_input: String,
        events: mpsc::Sender<OrchestrationEvent>,
        cancel: CancellationToken,
    ) {
        let started = Instant::now();
        log::info!(
            "conclave::group: run {} started ({} specialists, {:?} fan-out)",
            self.run_id,
            self.specialists.len(),
            self.fan_out
        );

        let terminal = match self.execute(&user_input, &events, &cancel).await {
            Ok(event) => event,
            Err(Disconnected) => {
                log::debug!("conclave::group: run {} consumer went away", self.run_id);
                return;
            }
        };

        match &terminal {
            OrchestrationEvent::Failure { stage, reason, .. } => log::warn!(
                "conclave::group: run {} failed at {}: {}",
                self.run_id,
                stage,
                reason
            ),
            _ => log::info!(
                "conclave::group: run {} complete in {:?}",
                self.run_id,
                started.elapsed()
            ),
        }
        // a closed channel at this point only means nobody is listening anymore
        let _ = events.send(terminal).await;
    }

    /// Run the three phases, sending progress events, and return the terminal event.
    async fn execute(
        &self,
        user_input: &str,
        events: &mpsc::Sender<OrchestrationEvent>,
        cancel: &CancellationToken,
    ) -> Result<OrchestrationEvent, Disconnected> {
        let coordinator = match &self.coordinator {
            Some(coordinator) => Arc::clone(coordinator),
            None => {
                return Ok(OrchestrationEvent::failure(
                    FailureStage::Setup,
                    NO_COORDINATOR,
                    Vec::new(),
                ))
            }
        };

        // Phase 1: analysis
        let analysis = {
            let mut coordinator = coordinator.lock().await;
            let analyze =
                coordinator.analyze_task(user_input, self.client.as_ref(), self.temperature);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                analysis = analyze => Some(analysis),
            }
        };
        let (analysis, coordinator_elapsed) = match analysis {
            None => return Ok(cancelled(FailureStage::Coordinator, Vec::new())),
            Some(Analysis::Failure { reason, .. }) => {
                return Ok(OrchestrationEvent::failure(
                    FailureStage::Coordinator,
                    reason,
                    Vec::new(),
                ))
            }
            Some(Analysis::Success { text, elapsed }) => (text, elapsed),
        };
        send(
            events,
            OrchestrationEvent::CoordinatorPhase {
                analysis: analysis.clone(),
                elapsed: coordinator_elapsed,
            },
        )
        .await?;

        // Phase 2: fan-out
        let mut progress = FanOutProgress::default();
        let finished = match self.fan_out {
            FanOutMode::Sequential => {
                self.fan_out_sequential(
                    user_input,
                    &analysis,
                    coordinator_elapsed,
                    &mut progress,
                    events,
                    cancel,
                )
                .await?
            }
            FanOutMode::Concurrent => {
                self.fan_out_concurrent(
                    user_input,
                    &analysis,
                    coordinator_elapsed,
                    &mut progress,
                    events,
                    cancel,
                )
                .await?
            }
        };
        if !finished {
            return Ok(cancelled(FailureStage::FanOut, progress.responses));
        }

        // Phase 3: synthesis
        let synthesis = {
            let replies: Vec<(&str, &str)> = progress
                .responses
                .iter()
                .map(|reply| (reply.agent.as_str(), reply.response.as_str()))
                .collect();
            let mut coordinator = coordinator.lock().await;
            let synthesize = coordinator.synthesize(
                user_input,
                &replies,
                self.client.as_ref(),
                self.temperature,
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                synthesis = synthesize => Some(synthesis),
            }
        };

        Ok(match synthesis {
            None => cancelled(FailureStage::Synthesis, progress.responses),
            Some(Err(err)) => OrchestrationEvent::failure(
                FailureStage::Synthesis,
                format!("Final evaluation failed: {}", err),
                progress.responses,
            ),
            Some(Ok(completion)) => {
                let slowest_elapsed = progress.slowest(coordinator_elapsed);
                OrchestrationEvent::CompletePhase {
                    responses: progress.responses,
                    coordinator_analysis: analysis,
                    final_synthesis: completion.text,
                    total_tokens: progress.tokens + completion.tokens,
                    per_agent_elapsed: progress.timings,
                    coordinator_elapsed,
                    slowest_elapsed,
                    synthesis_elapsed: completion.elapsed,
                }
            }
        })
    }

    /// Returns `Ok(false)` when cancelled before every specialist was asked.
    async fn fan_out_sequential(
        &self,
        user_input: &str,
        analysis: &str,
        coordinator_elapsed: Duration,
        progress: &mut FanOutProgress,
        events: &mpsc::Sender<OrchestrationEvent>,
        cancel: &CancellationToken,
    ) -> Result<bool, Disconnected> {
        for (name, agent) in &self.specialists {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(false),
                outcome = self.turn(name, agent, user_input) => outcome,
            };
            if let Some(event) = progress.absorb(outcome, analysis, coordinator_elapsed) {
                send(events, event).await?;
            }
        }
        Ok(true)
    }

    /// Returns `Ok(false)` when cancelled before every specialist answered.
    ///
    /// Every turn runs on its own task, so a consumer that is slow to read
    /// events neither delays the remaining calls nor inflates their timings.
    async fn fan_out_concurrent(
        &self,
        user_input: &str,
        analysis: &str,
        coordinator_elapsed: Duration,
        progress: &mut FanOutProgress,
        events: &mpsc::Sender<OrchestrationEvent>,
        cancel: &CancellationToken,
    ) -> Result<bool, Disconnected> {
        // dropping the set aborts whatever is still running
        let mut turns = JoinSet::new();
        for (name, agent) in &self.specialists {
            turns.spawn(self.turn(name, agent, user_input));
        }

        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(false),
                joined = turns.join_next() => joined,
            };
            match joined {
                Some(Ok(outcome)) => {
                    if let Some(event) = progress.absorb(outcome, analysis, coordinator_elapsed) {
                        send(events, event).await?;
                    }
                }
                Some(Err(err)) => {
                    log::error!(
                        "conclave::group: run {} lost a specialist task: {}",
                        self.run_id,
                        err
                    );
                }
                None => return Ok(true),
            }
        }
    }

    /// One specialist turn, detached from `self`: append the raw input, then
    /// answer through the cache.
    fn turn(
        &self,
        name: &str,
        agent: &SharedAgent,
        user_input: &str,
    ) -> impl Future<Output = SpecialistOutcome> + Send + 'static {
        let name = name.to_string();
        let agent = Arc::clone(agent);
        let cache = Arc::clone(&self.cache);
        let client = Arc::clone(&self.client);
        let temperature = self.temperature;
        let user_input = user_input.to_string();

        async move {
            let started = Instant::now();
            let mut agent = agent.lock().await;
            agent.append_message(Role::User, user_input);
            let result = cached_response(&cache, &mut agent, client.as_ref(), temperature).await;
            SpecialistOutcome {
                name,
                result,
                elapsed: started.elapsed(),
            }
        }
    }
}

async fn send(
    events: &mpsc::Sender<OrchestrationEvent>,
    event: OrchestrationEvent,
) -> Result<(), Disconnected> {
    events.send(event).await.map_err(|_| Disconnected)
}

fn cancelled(stage: FailureStage, responses: Vec<AgentReply>) -> OrchestrationEvent {
    OrchestrationEvent::failure(stage, CANCELLED, responses)
}
