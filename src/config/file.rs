//! TOML configuration file loading
//!
//! Supports `~/.config/grouch/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct GrouchConfigFile {
    /// Discord bot settings
    #[serde(default)]
    pub discord: DiscordFileConfig,

    /// Wake word and persona prompt
    #[serde(default)]
    pub persona: PersonaFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Base URLs of the remote services
    #[serde(default)]
    pub endpoints: EndpointsFileConfig,

    /// Chat completion parameters
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Voice capture and synthesis settings
    #[serde(default)]
    pub voice: VoiceFileConfig,
}

/// Discord bot settings
#[derive(Debug, Default, Deserialize)]
pub struct DiscordFileConfig {
    pub token: Option<String>,
}

/// Persona settings
#[derive(Debug, Default, Deserialize)]
pub struct PersonaFileConfig {
    /// Word that must prefix a typed request or appear in speech
    pub wake_word: Option<String>,

    /// System prompt sent with every dialogue request
    pub style_prompt: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub gladia: Option<String>,
    pub openai: Option<String>,
}

/// Remote service base URLs
#[derive(Debug, Default, Deserialize)]
pub struct EndpointsFileConfig {
    pub gladia_url: Option<String>,
    pub openai_url: Option<String>,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Model identifier (e.g. "gpt-3.5-turbo")
    pub model: Option<String>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Maximum reply length in tokens
    pub max_tokens: Option<u32>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Trailing silence that closes an utterance, in milliseconds
    pub silence_ms: Option<u64>,

    /// Segments shorter than this many bytes are discarded
    pub min_segment_bytes: Option<usize>,

    /// How long to wait for the voice connection to become ready
    pub join_timeout_secs: Option<u64>,

    /// Idle time after which a guild session is torn down
    pub session_idle_secs: Option<u64>,

    /// TTS language (e.g. "russian")
    pub tts_language: Option<String>,

    /// TTS voice identity (e.g. "female-neutral")
    pub tts_speaker: Option<String>,

    /// Wrap captured PCM in a WAV header before transcription
    pub stt_wav_container: Option<bool>,
}

/// Load the TOML config file from the standard path
///
/// Returns `GrouchConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> GrouchConfigFile {
    config_file_path().map_or_else(GrouchConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Missing or malformed files fall back to defaults with a warning.
pub fn load_from(path: &Path) -> GrouchConfigFile {
    if !path.exists() {
        return GrouchConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                GrouchConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            GrouchConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/grouch/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("grouch").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_file() {
        let fc: GrouchConfigFile = toml::from_str(
            r#"
            [persona]
            wake_word = "Ворчун"

            [voice]
            silence_ms = 1500
            "#,
        )
        .unwrap();

        assert_eq!(fc.persona.wake_word.as_deref(), Some("Ворчун"));
        assert_eq!(fc.voice.silence_ms, Some(1500));
        assert!(fc.api_keys.gladia.is_none());
        assert!(fc.llm.model.is_none());
    }

    #[test]
    fn test_missing_file_is_default() {
        let fc = load_from(Path::new("/definitely/not/here/config.toml"));
        assert!(fc.discord.token.is_none());
    }
}
