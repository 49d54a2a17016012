//! Application-level chat driver.
//!
//! [`ChatSession`] wraps an [`AgentGroup`] with what an interactive front end
//! needs around it: a default coordinator-plus-specialists setup built from
//! per-role model choices, single-agent and collective sends, running
//! [`SessionMetrics`] and a history of finished exchanges.
//!
//! ```rust,no_run
//! use conclave::clients::openrouter::OpenRouterClient;
//! use conclave::{AgentGroup, ChatSession, ConclaveConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     conclave::init_logger();
//!     let config = ConclaveConfig::from_env()?;
//!     let client = Arc::new(OpenRouterClient::from_config(&config));
//!
//!     let mut session = ChatSession::new(AgentGroup::from_config(client.clone(), &config));
//!     let models = session.setup_agents_from_catalog(client.as_ref(), None).await?;
//!     println!("coder runs on {:?}", models.coder);
//!
//!     for event in session.collect_collective("Write a prime sieve in Rust").await? {
//!         println!("{}", event.phase_name());
//!     }
//!     println!("{} tokens so far", session.metrics().total_tokens);
//!     Ok(())
//! }
//! ```

use crate::client_wrapper::{Completion, CompletionError, Message, ModelCatalog};
use crate::conclave::agent::{Agent, AgentRole, CoordinatorAgent};
use crate::conclave::config::{role_preset, RoleModels, DEFAULT_SPECIALIST_ROLES};
use crate::conclave::event::{AgentReply, OrchestrationEvent};
use crate::conclave::group::{AgentGroup, CollectiveRun, GroupError};
use crate::conclave::metrics::SessionMetrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::error::Error;
use std::fmt;

/// One finished exchange.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConversationRecord {
    /// A single-agent turn; `messages` is the agent's transcript after the reply.
    Single {
        at: DateTime<Utc>,
        agent: String,
        messages: Vec<Message>,
    },
    /// A collective run that reached `CompletePhase`.
    Collective {
        at: DateTime<Utc>,
        user_input: String,
        coordinator_analysis: String,
        responses: Vec<AgentReply>,
        final_synthesis: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionError {
    /// The message was empty or only whitespace.
    EmptyInput,
    /// No model was chosen for a role the default setup needs.
    MissingModel(AgentRole),
    /// The catalog returned no models.
    NoModelsAvailable,
    Catalog(CompletionError),
    Group(GroupError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::EmptyInput => write!(f, "Message is empty"),
            SessionError::MissingModel(role) => write!(f, "No model selected for role {}", role),
            SessionError::NoModelsAvailable => write!(f, "No models available"),
            SessionError::Catalog(err) => write!(f, "Failed to fetch models: {}", err),
            SessionError::Group(err) => write!(f, "{}", err),
        }
    }
}

impl Error for SessionError {}

impl From<GroupError> for SessionError {
    fn from(err: GroupError) -> Self {
        SessionError::Group(err)
    }
}

/// Pick a model per built-in role from `available`.
///
/// A saved choice is kept when the catalog still offers it; otherwise the
/// role falls back to the first available model. `None` when `available` is empty.
pub fn resolve_role_models(available: &[String], saved: Option<&RoleModels>) -> Option<RoleModels> {
    let fallback = available.first()?;
    let mut resolved = RoleModels::default();
    let roles = std::iter::once(AgentRole::Coordinator).chain(DEFAULT_SPECIALIST_ROLES);
    for role in roles {
        let choice = saved
            .and_then(|saved| saved.get(&role))
            .filter(|model| available.iter().any(|candidate| candidate == model))
            .unwrap_or(fallback.as_str());
        resolved.set(&role, choice);
    }
    Some(resolved)
}

/// Render a transcript as markdown, one `**Role**: content` paragraph per message.
pub fn format_transcript(messages: &[Message]) -> String {
    let mut formatted = String::new();
    for message in messages {
        let role = message.role.as_str();
        let mut chars = role.chars();
        let label: String = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
        formatted.push_str(&format!("**{}**: {}\n\n", label, message.content));
    }
    formatted
}

pub struct ChatSession {
    group: AgentGroup,
    metrics: SessionMetrics,
    history: Vec<ConversationRecord>,
    role_models: Option<RoleModels>,
}

impl ChatSession {
    pub fn new(group: AgentGroup) -> Self {
        Self {
            group,
            metrics: SessionMetrics::new(),
            history: Vec::new(),
            role_models: None,
        }
    }

    pub fn group(&self) -> &AgentGroup {
        &self.group
    }

    pub fn group_mut(&mut self) -> &mut AgentGroup {
        &mut self.group
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    pub fn history(&self) -> &[ConversationRecord] {
        &self.history
    }

    /// Models chosen by the last successful setup.
    pub fn role_models(&self) -> Option<&RoleModels> {
        self.role_models.as_ref()
    }

    /// Register the coordinator and the default specialists with the preset
    /// names and system messages of their roles.
    ///
    /// Every role must have a model; nothing is registered otherwise.
    pub fn setup_agents(&mut self, models: &RoleModels) -> Result<(), SessionError> {
        let coordinator_model = models
            .get(&AgentRole::Coordinator)
            .ok_or(SessionError::MissingModel(AgentRole::Coordinator))?;
        let mut specialists = Vec::with_capacity(DEFAULT_SPECIALIST_ROLES.len());
        for role in DEFAULT_SPECIALIST_ROLES {
            let model = models
                .get(&role)
                .ok_or_else(|| SessionError::MissingModel(role.clone()))?;
            specialists.push((role.clone(), model.to_string()));
        }

        if let Some(preset) = role_preset(&AgentRole::Coordinator) {
            self.group.add_agent(CoordinatorAgent::new(
                preset.name,
                coordinator_model,
                preset.system_message,
            ));
        }
        for (role, model) in specialists {
            if let Some(preset) = role_preset(&role) {
                self.group
                    .add_agent(Agent::new(preset.name, role, model, preset.system_message));
            }
        }

        log::info!(
            "conclave::session: default agents ready ({} specialists)",
            self.group.len()
        );
        self.role_models = Some(models.clone());
        Ok(())
    }

    /// Fetch the model list, resolve a model per role against `saved` and set up
    /// the default agents. Returns the models actually used.
    pub async fn setup_agents_from_catalog(
        &mut self,
        catalog: &dyn ModelCatalog,
        saved: Option<&RoleModels>,
    ) -> Result<RoleModels, SessionError> {
        let available = catalog.list_models().await.map_err(SessionError::Catalog)?;
        log::debug!("conclave::session: catalog offers {} models", available.len());
        let models =
            resolve_role_models(&available, saved).ok_or(SessionError::NoModelsAvailable)?;
        self.setup_agents(&models)?;
        Ok(models)
    }

    /// Single-agent turn with `agent_name`.
    pub async fn send_single(
        &mut self,
        agent_name: &str,
        user_input: &str,
    ) -> Result<Completion, SessionError> {
        if user_input.trim().is_empty() {
            return Err(SessionError::EmptyInput);
        }
        let completion = self.group.chat(agent_name, user_input).await?;

        if let Some(agent) = self.group.agent(agent_name).await {
            self.metrics.record_completion(&agent.model, &completion);
            self.history.push(ConversationRecord::Single {
                at: Utc::now(),
                agent: agent.name.clone(),
                messages: agent.snapshot_transcript(),
            });
        }
        Ok(completion)
    }

    /// Start a collective run. Feed its events back through
    /// [`record_event`](ChatSession::record_event) to update metrics and history.
    pub fn send_collective(&self, user_input: &str) -> Result<CollectiveRun, SessionError> {
        if user_input.trim().is_empty() {
            return Err(SessionError::EmptyInput);
        }
        Ok(self.group.run_collective(user_input))
    }

    /// Account one event of a collective run started with `user_input`.
    pub fn record_event(&mut self, user_input: &str, event: &OrchestrationEvent) {
        if !self.metrics.record_event(event) {
            return;
        }
        if let OrchestrationEvent::CompletePhase {
            responses,
            coordinator_analysis,
            final_synthesis,
            ..
        } = event
        {
            self.history.push(ConversationRecord::Collective {
                at: Utc::now(),
                user_input: user_input.to_string(),
                coordinator_analysis: coordinator_analysis.clone(),
                responses: responses.clone(),
                final_synthesis: final_synthesis.clone(),
            });
        }
    }

    /// Run a collective exchange to its end, recording it, and return every event.
    pub async fn collect_collective(
        &mut self,
        user_input: &str,
    ) -> Result<Vec<OrchestrationEvent>, SessionError> {
        let mut run = self.send_collective(user_input)?;
        let mut events = Vec::new();
        while let Some(event) = run.next_event().await {
            self.record_event(user_input, &event);
            events.push(event);
        }
        Ok(events)
    }

    /// New chat: clear the history and reset every transcript. Agents, cache
    /// and metrics are kept.
    pub async fn reset(&mut self) {
        self.history.clear();
        self.group.reset_conversations().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_wrapper::Role;

    fn models(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_resolve_keeps_available_saved_choices() {
        let mut saved = RoleModels::default();
        saved.set(&AgentRole::Coder, "b");
        saved.set(&AgentRole::Critic, "gone");

        let resolved = resolve_role_models(&models(&["a", "b"]), Some(&saved)).unwrap();
        assert_eq!(resolved.get(&AgentRole::Coder), Some("b"));
        assert_eq!(resolved.get(&AgentRole::Critic), Some("a"));
        assert_eq!(resolved.get(&AgentRole::Coordinator), Some("a"));
        assert_eq!(resolved.get(&AgentRole::UserProxy), Some("a"));
    }

    #[test]
    fn test_resolve_needs_a_model() {
        assert_eq!(resolve_role_models(&[], None), None);
    }

    #[test]
    fn test_format_transcript() {
        let formatted = format_transcript(&[
            Message::new(Role::System, "sys"),
            Message::new(Role::User, "hi"),
        ]);
        assert_eq!(formatted, "**System**: sys\n\n**User**: hi\n\n");
    }
}
