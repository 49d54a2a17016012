//! A [`CompletionClient`] is a narrow wrapper around a chat-completion endpoint.
//! It does not keep track of the conversation, for that every [`Agent`](crate::Agent)
//! owns its own transcript and hands a snapshot of it to the client on each call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Sampling temperature used when the caller does not pick one.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Represents the possible roles for a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    // set by the developer to steer the model's responses
    System,
    // a message sent by a human user (or app user)
    User,
    // lets the model know the content was generated as a response to a user message
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Represents a generic message to be sent to an LLM.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The actual content of the message.
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A successful completion call.
///
/// `elapsed` is the latency measured by whoever performed the call. When the
/// completion comes out of [`AgentGroup::get_response`](crate::AgentGroup::get_response)
/// it is the agent-bracketed wall time of the original (possibly cached) call.
#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    /// Assistant text of the first choice.
    pub text: String,
    /// Total tokens reported by the provider, `0` when the provider omits usage.
    pub tokens: usize,
    /// Wall time of the call.
    pub elapsed: Duration,
}

/// Structured failure reasons surfaced by a [`CompletionClient`] or [`ModelCatalog`].
///
/// Every remote fault is converted into one of these variants; none of them
/// is ever raised as a panic.
///
/// ```
/// use conclave::client_wrapper::CompletionError;
///
/// let err = CompletionError::MissingChoices;
/// assert_eq!(err.to_string(), "Invalid API response: missing choices");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompletionError {
    /// The request never produced an HTTP response (DNS, TLS, connect, body read).
    Transport(String),
    /// The endpoint answered with a non-2xx status.
    Status { code: u16, body: String },
    /// The payload was not valid JSON or did not match the expected shape.
    InvalidPayload(String),
    /// The payload parsed but carried no `choices`.
    MissingChoices,
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionError::Transport(msg) => write!(f, "Transport error: {}", msg),
            CompletionError::Status { code, body } => {
                write!(f, "HTTP status {}: {}", code, body)
            }
            CompletionError::InvalidPayload(msg) => write!(f, "Invalid API response: {}", msg),
            CompletionError::MissingChoices => write!(f, "Invalid API response: missing choices"),
        }
    }
}

impl Error for CompletionError {}

/// Trait defining the interface to a chat-completion service.
///
/// Implementations must never panic on remote faults: transport errors,
/// non-2xx statuses and malformed payloads all come back as [`CompletionError`].
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send the ordered conversation to `model` and return the assistant reply.
    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        temperature: f32,
    ) -> Result<Completion, CompletionError>;
}

/// Lists the model identifiers a provider can serve.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    /// Model identifiers in the order the provider returns them.
    async fn list_models(&self) -> Result<Vec<String>, CompletionError>;
}
