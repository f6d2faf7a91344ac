//! Joining and leaving guild voice channels

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::Result;
use crate::voice::{GuildId, PlayerRegistry, VoiceConnection};

/// Voice channel identifier
pub type ChannelId = u64;

/// Establishes voice connections
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Connect to `channel_id`, resolving once the connection is ready
    ///
    /// # Errors
    ///
    /// Returns error if the connection cannot be established
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId)
    -> Result<Arc<dyn VoiceConnection>>;

    /// Tear down the guild's connection, if any
    ///
    /// # Errors
    ///
    /// Returns error if the disconnect fails
    async fn leave(&self, guild_id: GuildId) -> Result<()>;
}

/// Why a join failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    /// The invoking user is not in a voice channel
    #[error("user is not in a voice channel")]
    NotInVoice,

    /// The connection did not become ready in time
    #[error("voice connection not ready: {0}")]
    NotReady(String),
}

/// A successful join
pub struct JoinOutcome {
    /// Channel the bot is now connected to
    pub channel_id: ChannelId,

    /// Whether this join created the guild's player
    pub player_created: bool,

    /// The ready connection
    pub connection: Arc<dyn VoiceConnection>,
}

/// Guild session lifecycle on top of a [`VoiceGateway`]
pub struct SessionManager {
    gateway: Arc<dyn VoiceGateway>,
    players: Arc<PlayerRegistry>,
    join_timeout: Duration,
}

impl SessionManager {
    /// Create a manager that joins through `gateway` and registers players in
    /// `players`
    #[must_use]
    pub fn new(
        gateway: Arc<dyn VoiceGateway>,
        players: Arc<PlayerRegistry>,
        join_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            players,
            join_timeout,
        }
    }

    /// Join the voice channel the invoking user is in
    ///
    /// `user_channel` is `None` when the user is not in voice; no connection
    /// is attempted in that case.
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::NotInVoice`] without a channel, and
    /// [`JoinError::NotReady`] if the connection fails or times out, after
    /// abandoning it
    pub async fn join(
        &self,
        guild_id: GuildId,
        user_channel: Option<ChannelId>,
    ) -> std::result::Result<JoinOutcome, JoinError> {
        let Some(channel_id) = user_channel else {
            tracing::debug!(guild_id, "join requested outside voice");
            return Err(JoinError::NotInVoice);
        };

        tracing::info!(guild_id, channel_id, "joining voice channel");

        let join = self.gateway.join(guild_id, channel_id);
        let connection = match tokio::time::timeout(self.join_timeout, join).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                tracing::warn!(guild_id, channel_id, error = %e, "voice join failed");
                self.abandon(guild_id).await;
                return Err(JoinError::NotReady(e.to_string()));
            }
            Err(_) => {
                tracing::warn!(
                    guild_id,
                    channel_id,
                    timeout_secs = self.join_timeout.as_secs(),
                    "voice connection not ready in time"
                );
                self.abandon(guild_id).await;
                return Err(JoinError::NotReady("timed out".to_string()));
            }
        };

        let handle = self.players.get_or_create(guild_id, connection.as_ref()).await;
        tracing::info!(guild_id, channel_id, player_created = handle.created, "voice ready");

        Ok(JoinOutcome {
            channel_id,
            player_created: handle.created,
            connection,
        })
    }

    /// Leave the guild's voice channel and drop its player
    ///
    /// # Errors
    ///
    /// Returns error if the gateway disconnect fails
    pub async fn leave(&self, guild_id: GuildId) -> Result<()> {
        self.players.remove(guild_id).await;
        self.gateway.leave(guild_id).await
    }

    /// Leave every guild whose player has been idle longer than `idle`
    pub async fn sweep_idle(&self, now: Instant, idle: Duration) -> Vec<GuildId> {
        let stale = self.players.sweep_idle(now, idle).await;
        for guild_id in &stale {
            if let Err(e) = self.gateway.leave(*guild_id).await {
                tracing::warn!(guild_id, error = %e, "failed to leave idle guild");
            }
        }
        stale
    }

    /// Shared player registry
    #[must_use]
    pub const fn players(&self) -> &Arc<PlayerRegistry> {
        &self.players
    }

    /// Tear down a connection that never became ready
    ///
    /// Any player left from an earlier session belongs to the old connection
    /// and is dropped with it.
    async fn abandon(&self, guild_id: GuildId) {
        self.players.remove(guild_id).await;
        if let Err(e) = self.gateway.leave(guild_id).await {
            tracing::debug!(guild_id, error = %e, "abandoning connection failed");
        }
    }
}

/// Remembers which call each guild's voice receiver is attached to
///
/// Every leave makes the next join build a fresh call, and handlers
/// registered on the old call never see the new one's events.
pub struct ReceiverTracker<C> {
    calls: Mutex<HashMap<GuildId, Weak<C>>>,
}

impl<C> Default for ReceiverTracker<C> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<C> ReceiverTracker<C> {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `call` still needs a receiver for `guild_id`
    ///
    /// Returns `true` at most once per call; the call is recorded as
    /// attached before returning.
    pub fn needs_receiver(&self, guild_id: GuildId, call: &Arc<C>) -> bool {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        let attached = calls
            .get(&guild_id)
            .is_some_and(|known| Weak::ptr_eq(known, &Arc::downgrade(call)));
        if attached {
            return false;
        }

        calls.insert(guild_id, Arc::downgrade(call));
        drop(calls);
        tracing::debug!(guild_id, "new call needs a voice receiver");
        true
    }

    /// Forget the guild's call
    pub fn forget(&self, guild_id: GuildId) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&guild_id);
    }
}
