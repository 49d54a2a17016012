//! # Conclave
//!
//! Conclave runs a small committee of LLM agents against a single question. One
//! coordinator agent reads the request and decides which specialists should
//! answer, every specialist answers on its own, and the coordinator merges
//! their replies into one final response.
//!
//! The crate provides:
//!
//! * **Agents**: [`Agent`] binds a name, an [`AgentRole`] and a model id to its own
//!   transcript; [`CoordinatorAgent`] adds task analysis and answer synthesis
//! * **Orchestration**: [`AgentGroup::run_collective`] runs the analyze, fan-out and
//!   synthesize phases and streams [`OrchestrationEvent`]s while it goes
//! * **Memoization**: a shared [`ResponseCache`] keyed by agent name and transcript, so
//!   identical conversations never reach the model twice
//! * **Providers**: the [`client_wrapper::CompletionClient`] trait, implemented for
//!   OpenRouter and any OpenAI-compatible endpoint by
//!   [`clients::openrouter::OpenRouterClient`]
//! * **Sessions**: [`ChatSession`] adds default role setup, metrics and history on top
//!   of a group
//!
//! ## Collective runs
//!
//! A run is a finite stream. It always ends with exactly one terminal event,
//! `CompletePhase` or `Failure`. A specialist whose call fails is logged and left
//! out; the run carries on with the others.
//!
//! ```rust,no_run
//! use conclave::clients::openrouter::OpenRouterClient;
//! use conclave::{Agent, AgentGroup, AgentRole, CoordinatorAgent, FanOutMode, OrchestrationEvent};
//! use futures_util::StreamExt;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     conclave::init_logger();
//!
//!     let client = Arc::new(OpenRouterClient::new(&std::env::var("OPENROUTER_API_KEY")?));
//!     let mut group = AgentGroup::new(client).with_fan_out(FanOutMode::Concurrent);
//!
//!     group.add_agent(CoordinatorAgent::new(
//!         "Coordinator",
//!         "anthropic/claude-3.5-sonnet",
//!         "You coordinate a team of specialists.",
//!     ));
//!     group.add_agent(Agent::new(
//!         "Code Assistant",
//!         AgentRole::Coder,
//!         "openai/gpt-4o-mini",
//!         "You are an expert programmer focused on writing clean, efficient code.",
//!     ));
//!     group.add_agent(Agent::new(
//!         "Critic",
//!         AgentRole::Critic,
//!         "meta-llama/llama-3.1-70b-instruct",
//!         "You are a thoughtful critic who provides detailed analysis and feedback.",
//!     ));
//!
//!     let mut run = group.run_collective("Implement an LRU cache in Rust");
//!     while let Some(event) = run.next().await {
//!         match event {
//!             OrchestrationEvent::CoordinatorPhase { analysis, .. } => println!("plan: {}", analysis),
//!             OrchestrationEvent::AgentPhase { agent_name, elapsed, .. } => {
//!                 println!("{} answered in {:?}", agent_name, elapsed)
//!             }
//!             OrchestrationEvent::CompletePhase { final_synthesis, total_tokens, .. } => {
//!                 println!("{}\n\n[{} tokens]", final_synthesis, total_tokens)
//!             }
//!             OrchestrationEvent::Failure { stage, reason, .. } => {
//!                 eprintln!("run stopped at {}: {}", stage, reason)
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Single-agent chat
//!
//! ```rust,no_run
//! use conclave::clients::openrouter::OpenRouterClient;
//! use conclave::{Agent, AgentGroup, AgentRole};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(OpenRouterClient::new(&std::env::var("OPENROUTER_API_KEY")?));
//! let mut group = AgentGroup::new(client);
//! group.add_agent(Agent::new("Critic", AgentRole::Critic, "openai/gpt-4o", "Be critical."));
//!
//! let reply = group.chat("Critic", "Is bubble sort ever the right choice?").await?;
//! println!("{} ({} tokens)", reply.text, reply.tokens);
//! # Ok(())
//! # }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] backend exactly once.
///
/// Applications embedding conclave can opt in to `RUST_LOG` driven diagnostics
/// without picking a logging backend upfront. Calling it again is a no-op.
///
/// ```rust
/// conclave::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        if env_logger::try_init().is_err() {
            log::debug!("conclave: a logger was already installed");
        }
    });
}

// Import the top-level `conclave` module.
pub mod conclave;

// Re-exporting key items for easier external access.
pub use conclave::agent::{Agent, AgentRole, Analysis, CoordinatorAgent, Participant};
pub use conclave::cache::{CacheKey, CacheStatus, ResponseCache};
pub use conclave::client_wrapper;
pub use conclave::client_wrapper::{
    Completion, CompletionClient, CompletionError, Message, ModelCatalog, Role,
};
pub use conclave::clients;
pub use conclave::config::{ConclaveConfig, ConfigError, RoleModels};
pub use conclave::event;
pub use conclave::event::{AgentReply, FailureStage, OrchestrationEvent};
pub use conclave::group::{AgentGroup, CollectiveRun, FanOutMode, GroupError};
pub use conclave::metrics::SessionMetrics;
pub use conclave::session::{ChatSession, ConversationRecord, SessionError};
