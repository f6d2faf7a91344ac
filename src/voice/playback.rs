//! Audio playback into guild voice connections
//!
//! Each guild gets at most one [`AudioPlayer`], created from its voice
//! connection on first use and reused for every later reply. Starting new
//! audio replaces whatever the player was outputting.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use symphonia::core::audio::Channels;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::sync::Mutex;

use crate::{Error, Result};

/// Guild identifier
pub type GuildId = u64;

/// Plays encoded audio into a voice channel
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// Start playing `audio`, replacing any current output
    ///
    /// # Errors
    ///
    /// Returns error if the audio cannot be handed to the voice connection
    async fn play(&self, audio: Vec<u8>) -> Result<()>;
}

/// An established voice connection that players can be attached to
pub trait VoiceConnection: Send + Sync {
    /// Create a player subscribed to this connection
    fn subscribe(&self) -> Arc<dyn AudioPlayer>;
}

/// Player returned by [`PlayerRegistry::get_or_create`]
#[derive(Clone)]
pub struct PlayerHandle {
    /// The guild's player
    pub player: Arc<dyn AudioPlayer>,

    /// Whether the player was created by this call
    pub created: bool,
}

struct Session {
    player: Arc<dyn AudioPlayer>,
    last_used: Instant,
}

/// Guild → player registry shared across tasks
#[derive(Default)]
pub struct PlayerRegistry {
    sessions: Mutex<HashMap<GuildId, Session>>,
}

impl PlayerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the guild's player, subscribing a new one if none exists
    pub async fn get_or_create(
        &self,
        guild_id: GuildId,
        connection: &dyn VoiceConnection,
    ) -> PlayerHandle {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();

        if let Some(session) = sessions.get_mut(&guild_id) {
            session.last_used = now;
            return PlayerHandle {
                player: Arc::clone(&session.player),
                created: false,
            };
        }

        let player = connection.subscribe();
        sessions.insert(
            guild_id,
            Session {
                player: Arc::clone(&player),
                last_used: now,
            },
        );
        tracing::info!(guild_id, "player created");

        PlayerHandle {
            player,
            created: true,
        }
    }

    /// Return the guild's player if one exists
    pub async fn get(&self, guild_id: GuildId) -> Option<Arc<dyn AudioPlayer>> {
        let mut sessions = self.sessions.lock().await;
        sessions.get_mut(&guild_id).map(|session| {
            session.last_used = Instant::now();
            Arc::clone(&session.player)
        })
    }

    /// Whether the guild has a player
    pub async fn contains(&self, guild_id: GuildId) -> bool {
        self.sessions.lock().await.contains_key(&guild_id)
    }

    /// Drop the guild's player
    ///
    /// Returns `true` if a session existed.
    pub async fn remove(&self, guild_id: GuildId) -> bool {
        let removed = self.sessions.lock().await.remove(&guild_id).is_some();
        if removed {
            tracing::info!(guild_id, "player removed");
        }
        removed
    }

    /// Remove sessions not used within `idle` of `now`
    pub async fn sweep_idle(&self, now: Instant, idle: Duration) -> Vec<GuildId> {
        let mut sessions = self.sessions.lock().await;
        let stale: Vec<GuildId> = sessions
            .iter()
            .filter(|(_, s)| now.saturating_duration_since(s.last_used) > idle)
            .map(|(guild_id, _)| *guild_id)
            .collect();

        for guild_id in &stale {
            sessions.remove(guild_id);
            tracing::info!(guild_id, "idle player removed");
        }

        stale
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether there are no live sessions
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

/// Format details of an encoded audio buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioInfo {
    pub sample_rate: Option<u32>,
    pub channels: Option<usize>,
    pub duration: Option<Duration>,
}

/// Probe an encoded buffer (MP3, WAV, ...) for its format
///
/// # Errors
///
/// Returns error if the container is not recognized
pub fn probe_audio(audio: &[u8]) -> Result<AudioInfo> {
    let source = MediaSourceStream::new(
        Box::new(Cursor::new(audio.to_vec())),
        MediaSourceStreamOptions::default(),
    );

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Audio(format!("unrecognized audio: {e}")))?;

    let track = probed
        .format
        .default_track()
        .ok_or_else(|| Error::Audio("audio has no tracks".to_string()))?;
    let params = &track.codec_params;

    let duration = match (params.n_frames, params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => {
            let nanos = u128::from(frames) * 1_000_000_000 / u128::from(rate);
            Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
        }
        _ => None,
    };

    Ok(AudioInfo {
        sample_rate: params.sample_rate,
        channels: params.channels.map(Channels::count),
        duration,
    })
}
