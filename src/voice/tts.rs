//! Text-to-speech (TTS) processing

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::config::{Config, secret_or_empty};
use crate::{Error, Result};

/// Synthesizes speech from text
///
/// `Ok(vec![])` means the service returned no audio; `Err` means the call
/// failed.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` to encoded audio bytes
    ///
    /// # Errors
    ///
    /// Returns error if the remote call fails or returns a non-success status
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Gladia text-to-speech client
pub struct GladiaSynthesizer {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    language: String,
    speaker: String,
}

impl GladiaSynthesizer {
    /// Create a new synthesizer against `base_url`
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        language: impl Into<String>,
        speaker: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            language: language.into(),
            speaker: speaker.into(),
        }
    }

    /// Create a synthesizer from resolved configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.endpoints.gladia_url.clone(),
            secret_or_empty(config.api_keys.gladia.as_ref()),
            config.voice.tts_language.clone(),
            config.voice.tts_speaker.clone(),
        )
    }
}

#[async_trait]
impl Synthesizer for GladiaSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            text: &'a str,
            language: &'a str,
            speaker: &'a str,
        }

        let request = TtsRequest {
            text,
            language: &self.language,
            speaker: &self.speaker,
        };

        tracing::debug!(chars = text.chars().count(), "starting Gladia synthesis");

        let url = format!(
            "{}/audio/text-to-audio/",
            self.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("x-gladia-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Gladia TTS request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Gladia TTS API error");
            return Err(Error::Tts(format!("Gladia TTS error {status}: {body}")));
        }

        let bytes = response.bytes().await?;
        tracing::debug!(audio_bytes = bytes.len(), "synthesis complete");
        Ok(bytes.to_vec())
    }
}
