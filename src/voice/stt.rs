//! Speech-to-text (STT) processing

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::config::{Config, secret_or_empty};
use crate::voice::{CHANNELS, SAMPLE_RATE, pcm_bytes_to_wav};
use crate::{Error, Result};

/// Transcribes an utterance to text
///
/// `Ok("")` means the service understood nothing; `Err` means the call failed.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe captured audio
    ///
    /// # Errors
    ///
    /// Returns error if the remote call fails or returns a non-success status
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;
}

/// Response from the Gladia transcription API
#[derive(serde::Deserialize)]
struct GladiaResponse {
    #[serde(default)]
    prediction: serde_json::Value,
}

impl GladiaResponse {
    /// Flatten `prediction` to a transcript
    ///
    /// Older responses carry a plain string, newer ones a list of segments
    /// with a `transcription` field each.
    fn transcript(&self) -> String {
        match &self.prediction {
            serde_json::Value::String(text) => text.trim().to_string(),
            serde_json::Value::Array(segments) => segments
                .iter()
                .filter_map(|s| s.get("transcription").and_then(serde_json::Value::as_str))
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            _ => String::new(),
        }
    }
}

/// Gladia speech-to-text client
pub struct GladiaTranscriber {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    wav_container: bool,
}

impl GladiaTranscriber {
    /// Create a new transcriber against `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            wav_container: false,
        }
    }

    /// Wrap raw PCM in a WAV header before upload
    #[must_use]
    pub const fn with_wav_container(mut self, enabled: bool) -> Self {
        self.wav_container = enabled;
        self
    }

    /// Create a transcriber from resolved configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.endpoints.gladia_url.clone(),
            secret_or_empty(config.api_keys.gladia.as_ref()),
        )
        .with_wav_container(config.voice.stt_wav_container)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/audio/text/audio-transcription/",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl Transcriber for GladiaTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Gladia transcription");

        let body = if self.wav_container {
            pcm_bytes_to_wav(audio, SAMPLE_RATE, CHANNELS)?
        } else {
            audio.to_vec()
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-gladia-key", self.api_key.expose_secret())
            .header("Accept", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Gladia STT request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Gladia STT API error");
            return Err(Error::Stt(format!("Gladia STT error {status}: {body}")));
        }

        let result: GladiaResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse Gladia STT response");
            e
        })?;

        let transcript = result.transcript();
        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> String {
        serde_json::from_str::<GladiaResponse>(json)
            .unwrap()
            .transcript()
    }

    #[test]
    fn test_prediction_string() {
        assert_eq!(parse(r#"{"prediction": " бот, привет "}"#), "бот, привет");
    }

    #[test]
    fn test_prediction_segments() {
        let json = r#"{"prediction": [
            {"transcription": "бот,"},
            {"transcription": ""},
            {"transcription": "привет"}
        ]}"#;
        assert_eq!(parse(json), "бот, привет");
    }

    #[test]
    fn test_missing_prediction_is_empty() {
        assert_eq!(parse(r#"{"other": 1}"#), "");
        assert_eq!(parse(r#"{"prediction": null}"#), "");
    }

    #[test]
    fn test_endpoint_trailing_slash() {
        let stt = GladiaTranscriber::new("http://localhost:9/", SecretString::from("k"));
        assert_eq!(
            stt.endpoint(),
            "http://localhost:9/audio/text/audio-transcription/"
        );
    }
}
