//! Agent System
//!
//! This module provides the [`Agent`] struct (an identity bound to a model and a
//! running transcript) and the [`CoordinatorAgent`], the one agent of a group
//! that analyses incoming requests and synthesizes the specialists' answers.
//!
//! # Core Components
//!
//! - **Agent**: name, [`AgentRole`], model id, system message and an append-only transcript
//! - **CoordinatorAgent**: an agent whose role is fixed to [`AgentRole::Coordinator`]; only it
//!   can [`analyze_task`](CoordinatorAgent::analyze_task) and [`synthesize`](CoordinatorAgent::synthesize)
//! - **Participant**: what [`AgentGroup::add_agent`](crate::AgentGroup::add_agent) accepts,
//!   either a specialist or a coordinator
//!
//! # Example
//!
//! ```rust
//! use conclave::{Agent, AgentRole, Role};
//!
//! let mut coder = Agent::new("Code Assistant", AgentRole::Coder, "openai/gpt-4o", "You write code.");
//! coder.append_message(Role::User, "Write fizzbuzz");
//! assert_eq!(coder.transcript().len(), 2);
//!
//! coder.reset();
//! assert_eq!(coder.transcript().len(), 1);
//! assert_eq!(coder.transcript()[0].role, Role::System);
//! ```

use crate::client_wrapper::{Completion, CompletionClient, CompletionError, Message, Role};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// The function an agent fills in a group.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AgentRole {
    Coordinator,
    UserProxy,
    Coder,
    Critic,
    Custom(String),
}

impl AgentRole {
    pub fn as_str(&self) -> &str {
        match self {
            AgentRole::Coordinator => "coordinator",
            AgentRole::UserProxy => "user_proxy",
            AgentRole::Coder => "coder",
            AgentRole::Critic => "critic",
            AgentRole::Custom(name) => name,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An LLM-backed participant with its own conversation transcript.
///
/// `transcript[0]` is always the system message built from `system_message`;
/// nothing removes it, and [`reset`](Agent::reset) truncates back to it.
#[derive(Clone, Debug)]
pub struct Agent {
    /// Unique identity key inside a group.
    pub name: String,
    pub role: AgentRole,
    /// Model identifier handed to the [`CompletionClient`].
    pub model: String,
    system_message: String,
    transcript: Vec<Message>,
    call_started: Option<Instant>,
    last_call_duration: Option<Duration>,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        role: AgentRole,
        model: impl Into<String>,
        system_message: impl Into<String>,
    ) -> Self {
        let system_message = system_message.into();
        Self {
            name: name.into(),
            role,
            model: model.into(),
            transcript: vec![Message::new(Role::System, system_message.clone())],
            system_message,
            call_started: None,
            last_call_duration: None,
        }
    }

    /// The system message `transcript[0]` is built from. Fixed at construction.
    pub fn system_message(&self) -> &str {
        &self.system_message
    }

    pub fn append_message(&mut self, role: Role, content: impl Into<String>) {
        self.transcript.push(Message::new(role, content));
    }

    /// Borrow the transcript.
    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// Owned copy of the transcript, safe to hand to a client while the
    /// agent keeps receiving messages.
    pub fn snapshot_transcript(&self) -> Vec<Message> {
        self.transcript.clone()
    }

    /// Drop every message but the system message.
    pub fn reset(&mut self) {
        self.transcript.truncate(1);
        self.transcript[0] = Message::new(Role::System, self.system_message.clone());
    }

    pub fn record_call_start(&mut self) {
        self.call_started = Some(Instant::now());
    }

    /// Close the bracket opened by [`record_call_start`](Agent::record_call_start)
    /// and return its duration. Without an open bracket the duration is zero.
    pub fn record_call_end(&mut self) -> Duration {
        let elapsed = self
            .call_started
            .take()
            .map(|started| started.elapsed())
            .unwrap_or_default();
        self.last_call_duration = Some(elapsed);
        elapsed
    }

    pub fn last_call_duration(&self) -> Option<Duration> {
        self.last_call_duration
    }

    /// One timed completion call over the current transcript. Does not append the reply.
    pub(crate) async fn timed_completion(
        &mut self,
        client: &dyn CompletionClient,
        temperature: f32,
    ) -> Result<Completion, CompletionError> {
        let messages = self.snapshot_transcript();
        self.record_call_start();
        let result = client.complete(&self.model, &messages, temperature).await;
        let elapsed = self.record_call_end();
        result.map(|completion| Completion {
            elapsed,
            ..completion
        })
    }
}

/// Outcome of [`CoordinatorAgent::analyze_task`].
#[derive(Clone, Debug, PartialEq)]
pub enum Analysis {
    /// The raw analysis text. It is passed through untouched; nothing parses it.
    Success { text: String, elapsed: Duration },
    Failure { reason: String, elapsed: Duration },
}

/// One specialist contribution as embedded in the synthesis prompt.
#[derive(Debug, Serialize)]
struct SynthesisEntry<'a> {
    agent: &'a str,
    response: &'a str,
}

/// The routing and synthesis agent of a group.
#[derive(Clone, Debug)]
pub struct CoordinatorAgent {
    agent: Agent,
}

impl CoordinatorAgent {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        system_message: impl Into<String>,
    ) -> Self {
        Self {
            agent: Agent::new(name, AgentRole::Coordinator, model, system_message),
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut Agent {
        &mut self.agent
    }

    pub fn name(&self) -> &str {
        &self.agent.name
    }

    /// Ask the model which specialist roles should handle `user_input`.
    ///
    /// The request is appended to the coordinator's transcript and, on
    /// success, so is the raw reply.
    pub async fn analyze_task(
        &mut self,
        user_input: &str,
        client: &dyn CompletionClient,
        temperature: f32,
    ) -> Analysis {
        self.agent
            .append_message(Role::User, analysis_prompt(user_input));

        match self.agent.timed_completion(client, temperature).await {
            Ok(completion) => {
                self.agent
                    .append_message(Role::Assistant, completion.text.clone());
                Analysis::Success {
                    text: completion.text,
                    elapsed: completion.elapsed,
                }
            }
            Err(err) => {
                log::warn!(
                    "conclave::agent: coordinator '{}' analysis failed: {}",
                    self.agent.name,
                    err
                );
                Analysis::Failure {
                    reason: err.to_string(),
                    elapsed: self.agent.last_call_duration().unwrap_or_default(),
                }
            }
        }
    }

    /// Ask the model for a final answer merging the specialists' replies.
    ///
    /// `replies` are `(agent name, response text)` pairs in the order they
    /// should appear in the prompt. The prompt is appended to the
    /// coordinator's transcript; the reply is not.
    pub async fn synthesize(
        &mut self,
        user_input: &str,
        replies: &[(&str, &str)],
        client: &dyn CompletionClient,
        temperature: f32,
    ) -> Result<Completion, CompletionError> {
        self.agent
            .append_message(Role::User, synthesis_prompt(user_input, replies));
        self.agent.timed_completion(client, temperature).await
    }
}

impl From<CoordinatorAgent> for Agent {
    fn from(coordinator: CoordinatorAgent) -> Self {
        coordinator.agent
    }
}

fn analysis_prompt(user_input: &str) -> String {
    format!(
        "User message: {}\n\n\
         Analyze this message and determine which types of agents should respond.\n\
         Response format: JSON with 'selected_roles' list and 'reasoning'",
        user_input
    )
}

/// Build the final-evaluation prompt. Replies are serialized as an ordered
/// JSON list of `{agent, response}` records.
pub fn synthesis_prompt(user_input: &str, replies: &[(&str, &str)]) -> String {
    let entries: Vec<SynthesisEntry<'_>> = replies
        .iter()
        .map(|&(agent, response)| SynthesisEntry { agent, response })
        .collect();
    // serializing borrowed strings into a Vec cannot fail
    let embedded = serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string());

    format!(
        "Here are all agent responses for the user input: {}\n\n\
         Agent responses:\n{}\n\n\
         Please provide a final evaluation and synthesis of these responses.\n\
         If the user is requesting code, you MUST include the final, optimized code implementation after your analysis.\n\
         Your response should follow this format:\n\n\
         1. Analysis: A clear, concise summary of the different approaches and their pros/cons\n\
         2. Final Implementation: If code was requested, provide the complete, optimized code that combines the best aspects of all responses\n\n\
         Make sure to include actual code, not just descriptions of what the code should do.",
        user_input, embedded
    )
}

/// Anything that can be registered with an [`AgentGroup`](crate::AgentGroup).
#[derive(Clone, Debug)]
pub enum Participant {
    Specialist(Agent),
    Coordinator(CoordinatorAgent),
}

impl Participant {
    pub fn name(&self) -> &str {
        match self {
            Participant::Specialist(agent) => &agent.name,
            Participant::Coordinator(coordinator) => coordinator.name(),
        }
    }
}

impl From<Agent> for Participant {
    /// An agent created with [`AgentRole::Coordinator`] registers as the coordinator.
    fn from(agent: Agent) -> Self {
        if agent.role == AgentRole::Coordinator {
            Participant::Coordinator(CoordinatorAgent { agent })
        } else {
            Participant::Specialist(agent)
        }
    }
}

impl From<CoordinatorAgent> for Participant {
    fn from(coordinator: CoordinatorAgent) -> Self {
        Participant::Coordinator(coordinator)
    }
}
