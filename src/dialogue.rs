//! Persona replies via an OpenAI-compatible chat completions API

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::{Config, secret_or_empty};
use crate::{Error, Result};

/// Produces the persona's reply to a request
#[async_trait]
pub trait Responder: Send + Sync {
    /// Generate a reply to `prompt`
    ///
    /// `Ok("")` means the service answered with no content.
    ///
    /// # Errors
    ///
    /// Returns error if the remote call fails or returns a non-success status
    async fn reply(&self, prompt: &str) -> Result<String>;
}

/// Chat completions client with a fixed system prompt
pub struct OpenAiDialogue {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    temperature: f32,
    max_tokens: u32,
    system_prompt: String,
}

impl OpenAiDialogue {
    /// Create a new dialogue client with the default generation parameters
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        system_prompt: impl Into<String>,
    ) -> Self {
        let defaults = crate::config::LlmConfig::default();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            model: defaults.model,
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            system_prompt: system_prompt.into(),
        }
    }

    /// Override model and sampling parameters
    #[must_use]
    pub fn with_generation(
        mut self,
        model: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        self.model = model.into();
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Create a dialogue client from resolved configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.endpoints.openai_url.clone(),
            secret_or_empty(config.api_keys.openai.as_ref()),
            config.persona.style_prompt.clone(),
        )
        .with_generation(
            config.llm.model.clone(),
            config.llm.temperature,
            config.llm.max_tokens,
        )
    }

    fn request<'a>(&'a self, prompt: &'a str) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: &self.system_prompt,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl Responder for OpenAiDialogue {
    async fn reply(&self, prompt: &str) -> Result<String> {
        tracing::debug!(model = %self.model, prompt, "requesting reply");

        let url = format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&self.request(prompt))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "chat completion request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat completion API error");
            return Err(Error::Dialogue(format!(
                "chat completion error {status}: {body}"
            )));
        }

        let result: ChatCompletionResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse chat completion response");
            e
        })?;

        let reply = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        tracing::info!(reply = %reply, "reply generated");
        Ok(reply)
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
