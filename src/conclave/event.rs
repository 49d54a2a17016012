//! Progress events of a collective run.
//!
//! [`AgentGroup::run_collective`](crate::AgentGroup::run_collective) returns a
//! stream of [`OrchestrationEvent`]s. A run always ends with exactly one
//! terminal event, [`CompletePhase`](OrchestrationEvent::CompletePhase) or
//! [`Failure`](OrchestrationEvent::Failure), after which the stream closes.
//!
//! # Event Flow
//!
//! ```text
//! CoordinatorPhase               (or Failure { stage: Setup | Coordinator })
//!   └─ AgentPhase × successful specialists
//! CompletePhase                  (or Failure { stage: Synthesis, responses })
//! ```
//!
//! Specialists whose call fails produce no event and are left out of every
//! aggregate that follows.
//!
//! # Example
//!
//! ```rust,no_run
//! use conclave::OrchestrationEvent;
//!
//! fn render(event: &OrchestrationEvent) {
//!     match event {
//!         OrchestrationEvent::CoordinatorPhase { analysis, .. } => println!("plan: {}", analysis),
//!         OrchestrationEvent::AgentPhase { agent_name, responses, .. } => {
//!             println!("{} answered ({} so far)", agent_name, responses.len())
//!         }
//!         OrchestrationEvent::CompletePhase { final_synthesis, total_tokens, .. } => {
//!             println!("{}\n[{} tokens]", final_synthesis, total_tokens)
//!         }
//!         OrchestrationEvent::Failure { stage, reason, .. } => eprintln!("{} failed: {}", stage, reason),
//!     }
//! }
//! ```

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Reason carried by a [`Failure`](OrchestrationEvent::Failure) when no coordinator is registered.
pub const NO_COORDINATOR: &str = "no coordinator";

/// Reason carried by a [`Failure`](OrchestrationEvent::Failure) produced by cancellation.
pub const CANCELLED: &str = "cancelled";

/// One specialist's successful answer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentReply {
    pub agent: String,
    pub response: String,
    /// Wall time of this specialist's turn, including any wait for its lock.
    pub elapsed: Duration,
}

/// Where a run stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// No coordinator registered; no client call was made.
    Setup,
    /// The coordinator's analysis call failed.
    Coordinator,
    /// The run was cancelled while specialists were answering.
    FanOut,
    /// The final synthesis call failed; partial responses are preserved.
    Synthesis,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Setup => "setup",
            FailureStage::Coordinator => "coordinator",
            FailureStage::FanOut => "fan_out",
            FailureStage::Synthesis => "synthesis",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    /// The coordinator finished its routing analysis.
    CoordinatorPhase { analysis: String, elapsed: Duration },

    /// One more specialist answered.
    AgentPhase {
        agent_name: String,
        response: String,
        /// This specialist's turn.
        elapsed: Duration,
        /// Every successful answer so far, including this one.
        responses: Vec<AgentReply>,
        cumulative_tokens: usize,
        per_agent_elapsed: BTreeMap<String, Duration>,
        /// Longest specialist turn so far.
        slowest_elapsed: Duration,
        coordinator_analysis: String,
        coordinator_elapsed: Duration,
    },

    /// Terminal: the coordinator produced the final synthesis.
    CompletePhase {
        responses: Vec<AgentReply>,
        coordinator_analysis: String,
        final_synthesis: String,
        /// Fan-out tokens plus synthesis tokens.
        total_tokens: usize,
        per_agent_elapsed: BTreeMap<String, Duration>,
        coordinator_elapsed: Duration,
        /// Longest specialist turn, or the coordinator's analysis time when no
        /// specialist answered.
        slowest_elapsed: Duration,
        synthesis_elapsed: Duration,
    },

    /// Terminal: the run stopped early. `responses` holds whatever the
    /// fan-out had collected; it is empty for setup and coordinator failures.
    Failure {
        stage: FailureStage,
        reason: String,
        responses: Vec<AgentReply>,
    },
}

impl OrchestrationEvent {
    pub fn failure(
        stage: FailureStage,
        reason: impl Into<String>,
        responses: Vec<AgentReply>,
    ) -> Self {
        OrchestrationEvent::Failure {
            stage,
            reason: reason.into(),
            responses,
        }
    }

    pub fn phase_name(&self) -> &'static str {
        match self {
            OrchestrationEvent::CoordinatorPhase { .. } => "coordinator",
            OrchestrationEvent::AgentPhase { .. } => "agent_response",
            OrchestrationEvent::CompletePhase { .. } => "complete",
            OrchestrationEvent::Failure { .. } => "failure",
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            OrchestrationEvent::CompletePhase { .. } | OrchestrationEvent::Failure { .. } => true,
            OrchestrationEvent::CoordinatorPhase { .. } | OrchestrationEvent::AgentPhase { .. } => {
                false
            }
        }
    }

    /// Responses carried by the event; empty for
    /// [`CoordinatorPhase`](OrchestrationEvent::CoordinatorPhase).
    pub fn responses(&self) -> &[AgentReply] {
        match self {
            OrchestrationEvent::CoordinatorPhase { .. } => &[],
            OrchestrationEvent::AgentPhase { responses, .. }
            | OrchestrationEvent::CompletePhase { responses, .. }
            | OrchestrationEvent::Failure { responses, .. } => responses,
        }
    }
}
