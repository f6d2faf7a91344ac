//! Voice receive: songbird events into utterance capture

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use songbird::events::context_data::VoiceTick;
use songbird::{CoreEvent, Event, EventContext, EventHandler as SongbirdEventHandler};

use crate::pipeline::Pipeline;
use crate::voice::{
    GuildId, PlayerRegistry, SpeakerId, UtteranceCapture, UtteranceSegment, samples_to_bytes,
};

/// How often open segments are checked for trailing silence
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Per-guild receive state shared by the songbird handlers and the ticker
struct ReceiverState {
    guild_id: GuildId,
    capture: Mutex<UtteranceCapture>,

    /// SSRC → Discord user id, learned from speaking-state updates
    speakers: Mutex<HashMap<u32, u64>>,
}

impl ReceiverState {
    fn new(guild_id: GuildId, silence: Duration) -> Self {
        Self {
            guild_id,
            capture: Mutex::new(UtteranceCapture::new(guild_id, silence)),
            speakers: Mutex::new(HashMap::new()),
        }
    }

    fn speaker_for(&self, ssrc: u32) -> SpeakerId {
        self.speakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&ssrc)
            .copied()
            .unwrap_or_else(|| SpeakerId::from(ssrc))
    }

    /// Learn the user behind `ssrc`
    ///
    /// A segment already open under the bare SSRC continues under the user id.
    fn map_speaker(&self, ssrc: u32, user_id: u64) {
        self.speakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ssrc, user_id);

        self.capture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rekey(SpeakerId::from(ssrc), user_id);
    }

    fn push_samples(&self, ssrc: u32, samples: &[i16], now: Instant) {
        let speaker = self.speaker_for(ssrc);
        let frame = samples_to_bytes(samples);
        self.capture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_frame(speaker, &frame, now);
    }

    /// Close silent segments, or `None` once the guild's session is gone
    async fn tick(&self, players: &PlayerRegistry, now: Instant) -> Option<Vec<UtteranceSegment>> {
        if !players.contains(self.guild_id).await {
            return None;
        }

        let closed = self
            .capture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .close_silent(now);
        Some(closed)
    }
}

/// Songbird event handler feeding one guild's capture
#[derive(Clone)]
pub struct VoiceReceiver {
    state: Arc<ReceiverState>,
}

impl VoiceReceiver {
    /// Create a receiver and start its silence ticker
    ///
    /// The ticker exits once songbird drops the handlers (call removed) or
    /// the guild's player session is gone.
    #[must_use]
    pub fn start(guild_id: GuildId, silence: Duration, pipeline: Arc<Pipeline>) -> Self {
        let state = Arc::new(ReceiverState::new(guild_id, silence));
        tokio::spawn(run_ticker(Arc::downgrade(&state), pipeline));

        Self { state }
    }

    /// Register for the voice events capture needs
    pub fn attach(&self, call: &mut songbird::Call) {
        call.add_global_event(Event::Core(CoreEvent::SpeakingStateUpdate), self.clone());
        call.add_global_event(Event::Core(CoreEvent::VoiceTick), self.clone());
        tracing::info!(guild_id = self.state.guild_id, "voice receiver attached");
    }
}

#[async_trait]
impl SongbirdEventHandler for VoiceReceiver {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        match ctx {
            EventContext::SpeakingStateUpdate(update) => {
                if let Some(user_id) = update.user_id {
                    tracing::trace!(ssrc = update.ssrc, user_id = user_id.0, "speaker mapped");
                    self.state.map_speaker(update.ssrc, user_id.0);
                }
            }
            EventContext::VoiceTick(VoiceTick { speaking, .. }) => {
                let now = Instant::now();
                for (&ssrc, data) in speaking {
                    match &data.decoded_voice {
                        Some(samples) if !samples.is_empty() => {
                            self.state.push_samples(ssrc, samples, now);
                        }
                        Some(_) => {}
                        None => tracing::trace!(ssrc, "voice tick without decoded audio"),
                    }
                }
            }
            _ => {}
        }

        None
    }
}

async fn run_ticker(state: Weak<ReceiverState>, pipeline: Arc<Pipeline>) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);

    loop {
        interval.tick().await;

        let Some(state) = state.upgrade() else {
            break;
        };
        let Some(closed) = state.tick(pipeline.players(), Instant::now()).await else {
            tracing::debug!(guild_id = state.guild_id, "voice session gone");
            break;
        };
        drop(state);

        for segment in closed {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                pipeline.handle_utterance(segment).await;
            });
        }
    }

    tracing::debug!("voice receiver ticker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;
    use crate::voice::{AudioPlayer, VoiceConnection};

    const SILENCE: Duration = Duration::from_millis(1200);
    const USER: u64 = 301_234_567_890_123_456;

    struct SilentPlayer;

    #[async_trait]
    impl AudioPlayer for SilentPlayer {
        async fn play(&self, _audio: Vec<u8>) -> Result<()> {
            Ok(())
        }
    }

    struct SilentConnection;

    impl VoiceConnection for SilentConnection {
        fn subscribe(&self) -> Arc<dyn AudioPlayer> {
            Arc::new(SilentPlayer)
        }
    }

    #[test]
    fn test_unmapped_ssrc_is_the_speaker() {
        let state = ReceiverState::new(1, SILENCE);
        assert_eq!(state.speaker_for(42), 42);

        state.map_speaker(42, USER);
        assert_eq!(state.speaker_for(42), USER);
        assert_eq!(state.speaker_for(43), 43);
    }

    #[tokio::test]
    async fn test_frames_use_mapped_user_id() {
        let players = PlayerRegistry::new();
        players.get_or_create(1, &SilentConnection).await;
        let state = ReceiverState::new(1, SILENCE);
        let t0 = Instant::now();

        state.map_speaker(42, USER);
        state.push_samples(42, &[1, 2], t0);

        let closed = state.tick(&players, t0 + SILENCE).await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].speaker, USER);
        assert_eq!(closed[0].audio, vec![1, 0, 2, 0]);
    }

    #[tokio::test]
    async fn test_mapping_mid_utterance_keeps_one_segment() {
        let players = PlayerRegistry::new();
        players.get_or_create(1, &SilentConnection).await;
        let state = ReceiverState::new(1, SILENCE);
        let t0 = Instant::now();
        let frame = Duration::from_millis(20);

        state.push_samples(42, &[1], t0);
        state.map_speaker(42, USER);
        state.push_samples(42, &[2], t0 + frame);

        let closed = state.tick(&players, t0 + frame + SILENCE).await.unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].speaker, USER);
        assert_eq!(closed[0].audio, vec![1, 0, 2, 0]);
        assert_eq!(closed[0].frames, 2);
        assert_eq!(closed[0].started_at, t0);
    }

    #[tokio::test]
    async fn test_tick_stops_without_session() {
        let players = PlayerRegistry::new();
        let state = ReceiverState::new(1, SILENCE);
        let t0 = Instant::now();
        state.push_samples(42, &[1], t0);

        assert!(state.tick(&players, t0 + SILENCE).await.is_none());

        players.get_or_create(1, &SilentConnection).await;
        assert_eq!(state.tick(&players, t0 + SILENCE).await.unwrap().len(), 1);

        players.remove(1).await;
        assert!(state.tick(&players, t0 + SILENCE).await.is_none());
    }
}
