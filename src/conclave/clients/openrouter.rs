//! The `OpenRouterClient` implements [`CompletionClient`] and [`ModelCatalog`]
//! for OpenRouter and any other OpenAI-compatible endpoint that exposes
//! `/chat/completions` and `/models`.
//!
//! # Example
//!
//! ```rust,no_run
//! use conclave::clients::openrouter::OpenRouterClient;
//! use conclave::client_wrapper::{CompletionClient, Message, Role, DEFAULT_TEMPERATURE};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = OpenRouterClient::new(&std::env::var("OPENROUTER_API_KEY")?);
//!     let completion = client
//!         .complete(
//!             "openai/gpt-4o-mini",
//!             &[Message::new(Role::User, "Say hello")],
//!             DEFAULT_TEMPERATURE,
//!         )
//!         .await?;
//!     println!("{} ({} tokens)", completion.text, completion.tokens);
//!     Ok(())
//! }
//! ```

use crate::client_wrapper::{
    Completion, CompletionClient, CompletionError, Message, ModelCatalog,
};
use crate::clients::common::{parse_completion_payload, parse_model_list, ChatRequest};
use crate::conclave::config::ConclaveConfig;
use crate::conclave::http_client_pool::get_or_create_client;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Instant;

/// Default OpenRouter API root.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// HTTP client for an OpenAI-compatible completion service.
pub struct OpenRouterClient {
    api_key: String,
    base_url: String,
    referer: Option<String>,
    title: Option<String>,
    http: reqwest::Client,
}

impl OpenRouterClient {
    /// Client against [`OPENROUTER_BASE_URL`].
    pub fn new(api_key: &str) -> Self {
        Self::new_with_base_url(api_key, OPENROUTER_BASE_URL)
    }

    /// Client against any OpenAI-compatible API root (no trailing slash needed).
    pub fn new_with_base_url(api_key: &str, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        OpenRouterClient {
            api_key: api_key.to_string(),
            http: get_or_create_client(&base_url),
            base_url,
            referer: None,
            title: None,
        }
    }

    /// Build a client from the API root, key and attribution headers of `config`.
    pub fn from_config(config: &ConclaveConfig) -> Self {
        let mut client = Self::new_with_base_url(&config.api_key, &config.base_url);
        client.referer = config.referer.clone();
        client.title = config.title.clone();
        client
    }

    /// `HTTP-Referer` attribution header sent with every request.
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    /// `X-Title` attribution header sent with every request.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut request = request.bearer_auth(&self.api_key);
        if let Some(referer) = &self.referer {
            request = request.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.title {
            request = request.header("X-Title", title);
        }
        request
    }

    /// Send the request and decode a JSON body, mapping every fault to [`CompletionError`].
    async fn fetch_json(&self, request: reqwest::RequestBuilder) -> Result<Value, CompletionError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|err| CompletionError::Transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| CompletionError::Transport(err.to_string()))?;

        if !status.is_success() {
            return Err(CompletionError::Status {
                code: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|err| CompletionError::InvalidPayload(err.to_string()))
    }
}

#[async_trait]
impl CompletionClient for OpenRouterClient {
    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        temperature: f32,
    ) -> Result<Completion, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);
        log::debug!(
            "conclave::clients::openrouter: POST {} model={} messages={}",
            url,
            model,
            messages.len()
        );

        let started = Instant::now();
        let request = self.http.post(&url).json(&ChatRequest {
            model,
            messages,
            temperature,
        });
        let result = self
            .fetch_json(request)
            .await
            .and_then(|payload| parse_completion_payload(&payload, started.elapsed()));

        if let Err(err) = &result {
            log::error!(
                "conclave::clients::openrouter::complete(...): model {} failed: {}",
                model,
                err
            );
        }
        result
    }
}

#[async_trait]
impl ModelCatalog for OpenRouterClient {
    async fn list_models(&self) -> Result<Vec<String>, CompletionError> {
        let url = format!("{}/models", self.base_url);
        let payload = self.fetch_json(self.http.get(&url)).await?;
        let models = parse_model_list(&payload)?;
        log::info!(
            "conclave::clients::openrouter: {} models available at {}",
            models.len(),
            self.base_url
        );
        Ok(models)
    }
}
