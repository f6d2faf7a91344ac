//! Per-utterance orchestration: transcribe, wake word, reply, speak, play
//!
//! Every utterance walks the stages in [`Stage`] order and ends in exactly
//! one [`UtteranceOutcome`]. Nothing is retried; a failed or empty stage
//! drops the utterance without invoking later stages.

use std::sync::Arc;

use tracing::Instrument;

use crate::Config;
use crate::dialogue::{OpenAiDialogue, Responder};
use crate::voice::{
    GladiaSynthesizer, GladiaTranscriber, GuildId, PlayerRegistry, Synthesizer, Transcriber,
    UtteranceSegment, WakeWord,
};

/// Utterance processing stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Capturing,
    Closed,
    Transcribing,
    WakeWordCheck,
    Generating,
    Synthesizing,
    Playing,
}

/// Why an utterance was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    TooShort,
    TranscriptionFailed,
    EmptyTranscript,
    DialogueFailed,
    EmptyReply,
    SynthesisFailed,
    EmptyAudio,
    PlaybackFailed,
}

/// Terminal state of one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UtteranceOutcome {
    /// Reply audio was handed to the guild's player
    Played { transcript: String, reply: String },

    /// A guard failed
    Dropped { stage: Stage, reason: DropReason },

    /// Transcript did not contain the wake word
    Skipped { transcript: String },
}

/// Result of a typed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextOutcome {
    Played { reply: String },
    DialogueFailed,
    SynthesisFailed,
    PlaybackFailed,
}

/// The STT → dialogue → TTS → playback chain shared by all guilds
pub struct Pipeline {
    transcriber: Arc<dyn Transcriber>,
    responder: Arc<dyn Responder>,
    synthesizer: Arc<dyn Synthesizer>,
    players: Arc<PlayerRegistry>,
    wake_word: WakeWord,
    min_segment_bytes: usize,
}

impl Pipeline {
    /// Create a pipeline from its collaborators
    #[must_use]
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        responder: Arc<dyn Responder>,
        synthesizer: Arc<dyn Synthesizer>,
        players: Arc<PlayerRegistry>,
        wake_word: WakeWord,
        min_segment_bytes: usize,
    ) -> Self {
        Self {
            transcriber,
            responder,
            synthesizer,
            players,
            wake_word,
            min_segment_bytes,
        }
    }

    /// Create a pipeline backed by the remote services in `config`
    #[must_use]
    pub fn from_config(config: &Config, players: Arc<PlayerRegistry>) -> Self {
        Self::new(
            Arc::new(GladiaTranscriber::from_config(config)),
            Arc::new(OpenAiDialogue::from_config(config)),
            Arc::new(GladiaSynthesizer::from_config(config)),
            players,
            WakeWord::new(&config.persona.wake_word),
            config.voice.min_segment_bytes,
        )
    }

    /// The configured wake word
    #[must_use]
    pub const fn wake_word(&self) -> &WakeWord {
        &self.wake_word
    }

    /// Shared player registry
    #[must_use]
    pub const fn players(&self) -> &Arc<PlayerRegistry> {
        &self.players
    }

    /// Run one closed segment through the chain
    ///
    /// Reply audio goes to the player the guild's join registered. If the
    /// session is gone by then, the utterance is dropped at
    /// [`Stage::Playing`] and no player is created.
    pub async fn handle_utterance(&self, segment: UtteranceSegment) -> UtteranceOutcome {
        let span = tracing::info_span!(
            "utterance",
            id = %uuid::Uuid::new_v4(),
            guild_id = segment.guild_id,
            speaker = segment.speaker,
            bytes = segment.len(),
        );

        let outcome = self.run_utterance(segment).instrument(span.clone()).await;
        span.in_scope(|| match &outcome {
            UtteranceOutcome::Played { .. } => tracing::info!("utterance played"),
            UtteranceOutcome::Dropped { stage, reason } => {
                tracing::debug!(?stage, ?reason, "utterance dropped");
            }
            UtteranceOutcome::Skipped { .. } => tracing::debug!("utterance skipped"),
        });
        outcome
    }

    async fn run_utterance(&self, segment: UtteranceSegment) -> UtteranceOutcome {
        if segment.len() < self.min_segment_bytes {
            tracing::debug!(min = self.min_segment_bytes, "segment too short");
            return dropped(Stage::Closed, DropReason::TooShort);
        }

        let transcript = match self.transcriber.transcribe(&segment.audio).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed");
                return dropped(Stage::Transcribing, DropReason::TranscriptionFailed);
            }
        };
        if transcript.is_empty() {
            return dropped(Stage::Transcribing, DropReason::EmptyTranscript);
        }

        if !self.wake_word.matches_transcript(&transcript) {
            return UtteranceOutcome::Skipped { transcript };
        }

        let reply = match self.responder.reply(&transcript).await {
            Ok(text) if text.trim().is_empty() => {
                return dropped(Stage::Generating, DropReason::EmptyReply);
            }
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "reply generation failed");
                return dropped(Stage::Generating, DropReason::DialogueFailed);
            }
        };

        let audio = match self.synthesizer.synthesize(&reply).await {
            Ok(audio) if audio.is_empty() => {
                return dropped(Stage::Synthesizing, DropReason::EmptyAudio);
            }
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(error = %e, "synthesis failed");
                return dropped(Stage::Synthesizing, DropReason::SynthesisFailed);
            }
        };

        if self.play(segment.guild_id, audio).await {
            UtteranceOutcome::Played { transcript, reply }
        } else {
            dropped(Stage::Playing, DropReason::PlaybackFailed)
        }
    }

    /// Answer a typed request out loud in the guild's voice channel
    pub async fn handle_text(&self, guild_id: GuildId, query: &str) -> TextOutcome {
        let span = tracing::info_span!("text_request", id = %uuid::Uuid::new_v4(), guild_id);

        async {
            let reply = match self.responder.reply(query).await {
                Ok(text) if !text.trim().is_empty() => text,
                Ok(_) => {
                    tracing::debug!("empty reply");
                    return TextOutcome::DialogueFailed;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "reply generation failed");
                    return TextOutcome::DialogueFailed;
                }
            };

            let audio = match self.synthesizer.synthesize(&reply).await {
                Ok(audio) if !audio.is_empty() => audio,
                Ok(_) => {
                    tracing::debug!("empty audio");
                    return TextOutcome::SynthesisFailed;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "synthesis failed");
                    return TextOutcome::SynthesisFailed;
                }
            };

            if self.play(guild_id, audio).await {
                TextOutcome::Played { reply }
            } else {
                TextOutcome::PlaybackFailed
            }
        }
        .instrument(span)
        .await
    }

    async fn play(&self, guild_id: GuildId, audio: Vec<u8>) -> bool {
        let Some(player) = self.players.get(guild_id).await else {
            tracing::debug!(guild_id, "no voice session, reply not played");
            return false;
        };
        let bytes = audio.len();

        match player.play(audio).await {
            Ok(()) => {
                tracing::info!(guild_id, bytes, "playback started");
                true
            }
            Err(e) => {
                tracing::warn!(guild_id, error = %e, "playback failed");
                false
            }
        }
    }
}

const fn dropped(stage: Stage, reason: DropReason) -> UtteranceOutcome {
    UtteranceOutcome::Dropped { stage, reason }
}
