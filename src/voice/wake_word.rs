//! Wake word matching for transcripts and typed messages

use crate::config::DEFAULT_WAKE_WORD;

/// Configured wake word, stored lowercase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeWord {
    word: String,
}

impl WakeWord {
    /// Create a wake word, falling back to the default when blank
    #[must_use]
    pub fn new(word: &str) -> Self {
        let word = word.trim().to_lowercase();
        if word.is_empty() {
            return Self::default();
        }
        Self { word }
    }

    /// The normalized word
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.word
    }

    /// Check if a transcript contains the wake word anywhere, ignoring case
    #[must_use]
    pub fn matches_transcript(&self, transcript: &str) -> bool {
        let found = transcript.to_lowercase().contains(&self.word);
        if found {
            tracing::debug!(wake_word = %self.word, transcript, "wake word detected");
        }
        found
    }

    /// Extract the request from a typed message addressed to the bot
    ///
    /// The trimmed message must start with the wake word followed by `,` or a
    /// space. Returns the remainder with leading separators trimmed, or the
    /// whole trimmed message if nothing follows the wake word.
    #[must_use]
    pub fn strip_request<'a>(&self, message: &'a str) -> Option<&'a str> {
        let trimmed = message.trim();

        // Match on chars, not bytes: lowercasing may change byte lengths
        let word_chars = self.word.chars().count();
        let split = trimmed
            .char_indices()
            .nth(word_chars)
            .map_or(trimmed.len(), |(i, _)| i);
        let (head, rest) = trimmed.split_at(split);

        if head.to_lowercase() != self.word {
            return None;
        }
        if !(rest.starts_with(',') || rest.starts_with(' ')) {
            return None;
        }

        let request = rest.trim_start_matches([',', ' ']).trim();
        if request.is_empty() {
            Some(trimmed)
        } else {
            Some(request)
        }
    }
}

impl Default for WakeWord {
    fn default() -> Self {
        Self {
            word: DEFAULT_WAKE_WORD.to_string(),
        }
    }
}

impl std::fmt::Display for WakeWord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wake_word_in_transcript() {
        let ww = WakeWord::new("бот");

        assert!(!ww.matches_transcript("привет всем"));
        assert!(ww.matches_transcript("Бот, привет"));
        assert!(ww.matches_transcript("эй БОТ скажи что-нибудь"));
    }

    #[test]
    fn test_wake_word_is_normalized() {
        let ww = WakeWord::new("  Ворчун ");
        assert_eq!(ww.as_str(), "ворчун");

        assert_eq!(WakeWord::new("   ").as_str(), DEFAULT_WAKE_WORD);
    }

    #[test]
    fn test_strip_request_comma() {
        let ww = WakeWord::new("бот");
        assert_eq!(ww.strip_request("бот, скажи тест"), Some("скажи тест"));
        assert_eq!(ww.strip_request("  Бот,скажи тест  "), Some("скажи тест"));
    }

    #[test]
    fn test_strip_request_space() {
        let ww = WakeWord::new("бот");
        assert_eq!(ww.strip_request("БОТ расскажи анекдот"), Some("расскажи анекдот"));
    }

    #[test]
    fn test_strip_request_requires_separator() {
        let ww = WakeWord::new("бот");

        assert_eq!(ww.strip_request("ботаник, привет"), None);
        assert_eq!(ww.strip_request("бот"), None);
        assert_eq!(ww.strip_request("привет, бот"), None);
    }

    #[test]
    fn test_strip_request_empty_remainder_keeps_message() {
        let ww = WakeWord::new("бот");
        assert_eq!(ww.strip_request("бот, "), Some("бот,"));
        assert_eq!(ww.strip_request("бот ,,"), Some("бот ,,"));
    }
}
