//! Configuration for conclave.
//!
//! [`ConclaveConfig`] carries the completion endpoint, credentials and run
//! defaults. Construct it by hand, start from [`ConclaveConfig::default`], or
//! read it from the process environment (and an optional `.env` file) with
//! [`ConclaveConfig::from_env`].
//!
//! # Example
//!
//! ```rust
//! use conclave::{ConclaveConfig, FanOutMode};
//!
//! let config = ConclaveConfig {
//!     api_key: "sk-test".into(),
//!     fan_out: FanOutMode::Concurrent,
//!     ..ConclaveConfig::default()
//! };
//! assert_eq!(config.base_url, "https://openrouter.ai/api/v1");
//! ```
//!
//! The module also holds the default role presets used by
//! [`ChatSession::setup_agents`](crate::ChatSession::setup_agents) and the
//! [`RoleModels`] record callers may persist between sessions.

use crate::client_wrapper::DEFAULT_TEMPERATURE;
use crate::clients::openrouter::OPENROUTER_BASE_URL;
use crate::conclave::agent::AgentRole;
use crate::conclave::group::FanOutMode;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

/// Environment variable holding the API key.
pub const API_KEY_VAR: &str = "OPENROUTER_API_KEY";
/// Optional override of the API root.
pub const BASE_URL_VAR: &str = "CONCLAVE_BASE_URL";
/// Optional override of the sampling temperature.
pub const TEMPERATURE_VAR: &str = "CONCLAVE_TEMPERATURE";
/// Optional fan-out mode, `sequential` or `concurrent`.
pub const FAN_OUT_VAR: &str = "CONCLAVE_FAN_OUT";

/// Global configuration for a conclave session.
#[derive(Clone, Debug, PartialEq)]
pub struct ConclaveConfig {
    /// Bearer token for the completion endpoint.
    pub api_key: String,
    /// API root; `/chat/completions` and `/models` are appended to it.
    pub base_url: String,
    /// Optional `HTTP-Referer` attribution header.
    pub referer: Option<String>,
    /// Optional `X-Title` attribution header.
    pub title: Option<String>,
    /// Temperature passed on every completion call.
    pub temperature: f32,
    /// How specialists are called during a collective run.
    pub fan_out: FanOutMode,
    /// Capacity of the event channel between a run and its consumer.
    pub event_buffer: usize,
}

impl Default for ConclaveConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: OPENROUTER_BASE_URL.to_string(),
            referer: Some("http://localhost:8501".to_string()),
            title: Some("Conclave".to_string()),
            temperature: DEFAULT_TEMPERATURE,
            fan_out: FanOutMode::Sequential,
            event_buffer: 16,
        }
    }
}

impl ConclaveConfig {
    /// Load a `.env` file if one exists, then read the configuration from the
    /// process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("conclave::config: loaded {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// ```rust
    /// use conclave::{ConclaveConfig, FanOutMode};
    ///
    /// let config = ConclaveConfig::from_lookup(|key| match key {
    ///     "OPENROUTER_API_KEY" => Some("sk-test".to_string()),
    ///     "CONCLAVE_FAN_OUT" => Some("concurrent".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert_eq!(config.fan_out, FanOutMode::Concurrent);
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let mut config = ConclaveConfig {
            api_key,
            ..ConclaveConfig::default()
        };

        if let Some(base_url) = lookup(BASE_URL_VAR) {
            config.base_url = base_url;
        }
        if let Some(raw) = lookup(TEMPERATURE_VAR) {
            config.temperature = raw
                .parse()
                .map_err(|_| ConfigError::Invalid(TEMPERATURE_VAR, raw.clone()))?;
        }
        if let Some(raw) = lookup(FAN_OUT_VAR) {
            config.fan_out = match raw.to_ascii_lowercase().as_str() {
                "sequential" => FanOutMode::Sequential,
                "concurrent" => FanOutMode::Concurrent,
                _ => return Err(ConfigError::Invalid(FAN_OUT_VAR, raw)),
            };
        }
        Ok(config)
    }
}

/// Errors raised while reading a [`ConclaveConfig`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// `OPENROUTER_API_KEY` is unset or blank.
    MissingApiKey,
    /// A variable is set but cannot be parsed.
    Invalid(&'static str, String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingApiKey => write!(f, "{} is not set", API_KEY_VAR),
            ConfigError::Invalid(var, value) => write!(f, "Invalid value for {}: {}", var, value),
        }
    }
}

impl Error for ConfigError {}

/// Display name and system message of a built-in role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RolePreset {
    pub name: &'static str,
    pub description: &'static str,
    pub system_message: &'static str,
}

const COORDINATOR_PRESET: RolePreset = RolePreset {
    name: "Coordinator",
    description: "Coordinates and manages other agents",
    system_message: "You are a coordinator agent responsible for:\n\
1. Analyzing user messages\n\
2. Determining which specialized agents should respond\n\
3. Combining and summarizing agent responses\n\
4. Ensuring coherent multi-agent conversations\n\
\n\
Always explain your reasoning when delegating tasks to agents.",
};

const USER_PROXY_PRESET: RolePreset = RolePreset {
    name: "Human Assistant",
    description: "Represents the user's interests and manages task delegation",
    system_message: "You are a helpful assistant representing the user's interests.",
};

const CODER_PRESET: RolePreset = RolePreset {
    name: "Code Assistant",
    description: "Specialized in writing and reviewing code",
    system_message: "You are an expert programmer focused on writing clean, efficient code.",
};

const CRITIC_PRESET: RolePreset = RolePreset {
    name: "Critic",
    description: "Reviews and provides constructive feedback",
    system_message: "You are a thoughtful critic who provides detailed analysis and feedback.",
};

/// Preset for a built-in role; `None` for [`AgentRole::Custom`].
pub fn role_preset(role: &AgentRole) -> Option<RolePreset> {
    match role {
        AgentRole::Coordinator => Some(COORDINATOR_PRESET),
        AgentRole::UserProxy => Some(USER_PROXY_PRESET),
        AgentRole::Coder => Some(CODER_PRESET),
        AgentRole::Critic => Some(CRITIC_PRESET),
        AgentRole::Custom(_) => None,
    }
}

/// Specialist roles created by a default setup, in registration order.
pub const DEFAULT_SPECIALIST_ROLES: [AgentRole; 3] =
    [AgentRole::UserProxy, AgentRole::Coder, AgentRole::Critic];

/// Model chosen for each built-in role.
///
/// The crate never reads or writes this record itself; it is serde-ready so
/// the surrounding application can persist the user's choices.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleModels {
    pub coordinator: Option<String>,
    pub user_proxy: Option<String>,
    pub coder: Option<String>,
    pub critic: Option<String>,
}

impl RoleModels {
    /// Same model for every role.
    pub fn uniform(model: impl Into<String>) -> Self {
        let model = model.into();
        RoleModels {
            coordinator: Some(model.clone()),
            user_proxy: Some(model.clone()),
            coder: Some(model.clone()),
            critic: Some(model),
        }
    }

    pub fn get(&self, role: &AgentRole) -> Option<&str> {
        match role {
            AgentRole::Coordinator => self.coordinator.as_deref(),
            AgentRole::UserProxy => self.user_proxy.as_deref(),
            AgentRole::Coder => self.coder.as_deref(),
            AgentRole::Critic => self.critic.as_deref(),
            AgentRole::Custom(_) => None,
        }
    }

    pub fn set(&mut self, role: &AgentRole, model: impl Into<String>) {
        let slot = match role {
            AgentRole::Coordinator => &mut self.coordinator,
            AgentRole::UserProxy => &mut self.user_proxy,
            AgentRole::Coder => &mut self.coder,
            AgentRole::Critic => &mut self.critic,
            AgentRole::Custom(_) => return,
        };
        *slot = Some(model.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_is_rejected() {
        assert_eq!(
            ConclaveConfig::from_lookup(|_| None),
            Err(ConfigError::MissingApiKey)
        );
        assert_eq!(
            ConclaveConfig::from_lookup(|key| (key == API_KEY_VAR).then(|| "  ".to_string())),
            Err(ConfigError::MissingApiKey)
        );
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = ConclaveConfig::from_lookup(|key| match key {
            API_KEY_VAR => Some("sk".to_string()),
            BASE_URL_VAR => Some("http://localhost:1234/v1".to_string()),
            TEMPERATURE_VAR => Some("0.2".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.base_url, "http://localhost:1234/v1");
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.fan_out, FanOutMode::Sequential);
    }

    #[test]
    fn test_bad_fan_out_mode_is_reported() {
        let result = ConclaveConfig::from_lookup(|key| match key {
            API_KEY_VAR => Some("sk".to_string()),
            FAN_OUT_VAR => Some("sideways".to_string()),
            _ => None,
        });
        assert_eq!(
            result,
            Err(ConfigError::Invalid(FAN_OUT_VAR, "sideways".to_string()))
        );
    }

    #[test]
    fn test_role_models_round_trip_through_json() {
        let mut models = RoleModels::default();
        models.set(&AgentRole::Coder, "openai/gpt-4o");
        models.set(&AgentRole::Custom("x".into()), "ignored");

        let json = serde_json::to_string(&models).unwrap();
        let restored: RoleModels = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.get(&AgentRole::Coder), Some("openai/gpt-4o"));
        assert_eq!(restored.get(&AgentRole::Critic), None);
    }

    #[test]
    fn test_custom_roles_have_no_preset() {
        assert!(role_preset(&AgentRole::Custom("poet".into())).is_none());
        assert_eq!(role_preset(&AgentRole::Critic).unwrap().name, "Critic");
    }
}
