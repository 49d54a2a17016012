//! Per-session usage accounting.

use crate::client_wrapper::Completion;
use crate::conclave::event::OrchestrationEvent;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Model name collective runs are counted under in [`SessionMetrics::model_usage`].
pub const COLLECTIVE_MODEL: &str = "collective";

/// Running totals across every send of a session.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SessionMetrics {
    pub total_tokens: usize,
    /// One entry per successful send, in order.
    pub response_times: Vec<Duration>,
    /// Successful sends per model id.
    pub model_usage: BTreeMap<String, usize>,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, model: &str, tokens: usize, elapsed: Duration) {
        self.total_tokens += tokens;
        self.response_times.push(elapsed);
        *self.model_usage.entry(model.to_string()).or_insert(0) += 1;
    }

    /// Account a single-agent completion against `model`.
    pub fn record_completion(&mut self, model: &str, completion: &Completion) {
        self.record(model, completion.tokens, completion.elapsed);
    }

    /// Account a finished collective run. Only `CompletePhase` counts; its
    /// response time is the slowest specialist turn.
    pub fn record_event(&mut self, event: &OrchestrationEvent) -> bool {
        match event {
            OrchestrationEvent::CompletePhase {
                total_tokens,
                slowest_elapsed,
                ..
            } => {
                self.record(COLLECTIVE_MODEL, *total_tokens, *slowest_elapsed);
                true
            }
            _ => false,
        }
    }

    pub fn average_response_time(&self) -> Option<Duration> {
        if self.response_times.is_empty() {
            return None;
        }
        let total: Duration = self.response_times.iter().sum();
        Some(total / self.response_times.len() as u32)
    }

    pub fn usage_for(&self, model: &str) -> usize {
        self.model_usage.get(model).copied().unwrap_or(0)
    }
}
