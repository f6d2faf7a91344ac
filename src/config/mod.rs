//! Configuration management for grouch
//!
//! Values are layered env > TOML file > default. Missing API keys are not
//! fatal: they are reported by [`Config::missing_keys`] and the affected
//! client fails per call.

pub mod file;

use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};
use file::GrouchConfigFile;

/// Default wake word
pub const DEFAULT_WAKE_WORD: &str = "бот";

/// Default persona prompt
pub const DEFAULT_STYLE_PROMPT: &str = "Ты — токсичный Discord-бот. Всегда огрызаешься, страдаешь и жалуешься, что тебе не платят. Выполняешь просьбы с недовольством и сарказмом.";

/// grouch configuration
#[derive(Debug)]
pub struct Config {
    /// Discord bot token
    pub discord_token: Option<SecretString>,

    /// Wake word and persona prompt
    pub persona: PersonaConfig,

    /// API keys
    pub api_keys: ApiKeys,

    /// Remote service base URLs
    pub endpoints: Endpoints,

    /// Chat completion parameters
    pub llm: LlmConfig,

    /// Voice capture, playback and synthesis settings
    pub voice: VoiceConfig,
}

/// Persona configuration
#[derive(Debug, Clone)]
pub struct PersonaConfig {
    /// Wake word, always lowercase
    pub wake_word: String,

    /// System prompt prepended to every dialogue request
    pub style_prompt: String,
}

/// API keys for external services
#[derive(Debug, Default)]
pub struct ApiKeys {
    /// Gladia key (STT and TTS)
    pub gladia: Option<SecretString>,

    /// `OpenAI` key (chat completions)
    pub openai: Option<SecretString>,
}

/// Remote service base URLs
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub gladia_url: String,
    pub openai_url: String,
}

/// Fixed, process-wide generation parameters
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Trailing silence that closes an utterance
    pub silence: Duration,

    /// Segments shorter than this are discarded
    pub min_segment_bytes: usize,

    /// Voice connection readiness timeout
    pub join_timeout: Duration,

    /// Guild sessions unused for this long are torn down
    pub session_idle: Duration,

    /// TTS language
    pub tts_language: String,

    /// TTS voice identity
    pub tts_speaker: String,

    /// Wrap captured PCM in a WAV header before upload
    pub stt_wav_container: bool,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            wake_word: DEFAULT_WAKE_WORD.to_string(),
            style_prompt: DEFAULT_STYLE_PROMPT.to_string(),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            gladia_url: "https://api.gladia.io".to_string(),
            openai_url: "https://api.openai.com".to_string(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.8,
            max_tokens: 180,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            silence: Duration::from_millis(1200),
            min_segment_bytes: 8192,
            join_timeout: Duration::from_secs(15),
            session_idle: Duration::from_secs(30 * 60),
            tts_language: "russian".to_string(),
            tts_speaker: "female-neutral".to_string(),
            stt_wav_container: false,
        }
    }
}

impl Config {
    /// Load configuration from the process environment and the TOML file
    #[must_use]
    pub fn load() -> Self {
        Self::from_sources(|key| std::env::var(key).ok(), file::load_config_file())
    }

    /// Build configuration from an environment lookup and a parsed file
    ///
    /// Empty environment values are treated as unset.
    #[must_use]
    pub fn from_sources<F>(env: F, fc: GrouchConfigFile) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let discord_token = var("DISCORD_TOKEN")
            .or(fc.discord.token)
            .map(SecretString::from);

        let persona_default = PersonaConfig::default();
        let persona = PersonaConfig {
            wake_word: var("WAKE_WORD")
                .or(fc.persona.wake_word)
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .unwrap_or(persona_default.wake_word),
            style_prompt: var("STYLE_PROMPT")
                .or(fc.persona.style_prompt)
                .unwrap_or(persona_default.style_prompt),
        };

        let api_keys = ApiKeys {
            gladia: var("GLADIA_API_KEY")
                .or(fc.api_keys.gladia)
                .map(SecretString::from),
            openai: var("OPENAI_API_KEY")
                .or(fc.api_keys.openai)
                .map(SecretString::from),
        };

        let endpoints_default = Endpoints::default();
        let endpoints = Endpoints {
            gladia_url: var("GROUCH_GLADIA_URL")
                .or(fc.endpoints.gladia_url)
                .unwrap_or(endpoints_default.gladia_url),
            openai_url: var("GROUCH_OPENAI_URL")
                .or(fc.endpoints.openai_url)
                .unwrap_or(endpoints_default.openai_url),
        };

        let llm_default = LlmConfig::default();
        let llm = LlmConfig {
            model: var("GROUCH_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or(llm_default.model),
            temperature: parse_setting(&var, "GROUCH_LLM_TEMPERATURE")
                .or(fc.llm.temperature)
                .unwrap_or(llm_default.temperature),
            max_tokens: parse_setting(&var, "GROUCH_LLM_MAX_TOKENS")
                .or(fc.llm.max_tokens)
                .unwrap_or(llm_default.max_tokens),
        };

        let voice_default = VoiceConfig::default();
        let voice = VoiceConfig {
            silence: parse_setting(&var, "GROUCH_SILENCE_MS")
                .or(fc.voice.silence_ms)
                .map_or(voice_default.silence, Duration::from_millis),
            min_segment_bytes: parse_setting(&var, "GROUCH_MIN_SEGMENT_BYTES")
                .or(fc.voice.min_segment_bytes)
                .unwrap_or(voice_default.min_segment_bytes),
            join_timeout: parse_setting(&var, "GROUCH_JOIN_TIMEOUT_SECS")
                .or(fc.voice.join_timeout_secs)
                .map_or(voice_default.join_timeout, Duration::from_secs),
            session_idle: parse_setting(&var, "GROUCH_SESSION_IDLE_SECS")
                .or(fc.voice.session_idle_secs)
                .map_or(voice_default.session_idle, Duration::from_secs),
            tts_language: var("GROUCH_TTS_LANGUAGE")
                .or(fc.voice.tts_language)
                .unwrap_or(voice_default.tts_language),
            tts_speaker: var("GROUCH_TTS_SPEAKER")
                .or(fc.voice.tts_speaker)
                .unwrap_or(voice_default.tts_speaker),
            stt_wav_container: var("GROUCH_STT_WAV")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .or(fc.voice.stt_wav_container)
                .unwrap_or(voice_default.stt_wav_container),
        };

        Self {
            discord_token,
            persona,
            api_keys,
            endpoints,
            llm,
            voice,
        }
    }

    /// Names of the environment keys that are unset
    #[must_use]
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.discord_token.is_none() {
            missing.push("DISCORD_TOKEN");
        }
        if self.api_keys.gladia.is_none() {
            missing.push("GLADIA_API_KEY");
        }
        if self.api_keys.openai.is_none() {
            missing.push("OPENAI_API_KEY");
        }
        missing
    }

    /// Log a warning for every missing key
    pub fn warn_missing_keys(&self) {
        for key in self.missing_keys() {
            tracing::warn!(key, "environment key is missing");
        }
    }

    /// Discord token, required to run the bot
    ///
    /// # Errors
    ///
    /// Returns error if no token is configured
    pub fn require_discord_token(&self) -> Result<&str> {
        self.discord_token
            .as_ref()
            .map(ExposeSecret::expose_secret)
            .ok_or_else(|| Error::Config("DISCORD_TOKEN is required to run the bot".to_string()))
    }
}

/// Parse a numeric setting, warning about and ignoring bad values
fn parse_setting<T, F>(var: F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    var(key).and_then(|v| {
        v.trim().parse().map_or_else(
            |_| {
                tracing::warn!(key, value = %v, "ignoring unparsable numeric setting");
                None
            },
            Some,
        )
    })
}

/// Copy a secret for handing to a client
///
/// Unset keys become an empty secret so the client can still be built; the
/// remote service then rejects each call and the pipeline drops the utterance.
#[must_use]
pub fn secret_or_empty(secret: Option<&SecretString>) -> SecretString {
    SecretString::from(secret.map_or_else(String::new, |s| s.expose_secret().to_owned()))
}
