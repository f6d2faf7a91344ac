//! Error types for grouch

use thiserror::Error;

/// Result type alias for grouch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in grouch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Voice connection or receive error
    #[error("voice error: {0}")]
    Voice(String),

    /// Audio buffer handling error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Chat completion error
    #[error("dialogue error: {0}")]
    Dialogue(String),

    /// Discord gateway or REST error
    #[error("discord error: {0}")]
    Discord(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<serenity::Error> for Error {
    fn from(e: serenity::Error) -> Self {
        Self::Discord(e.to_string())
    }
}
