//! songbird-backed voice connections and players

use std::sync::Arc;

use async_trait::async_trait;
use serenity::all::{ChannelId as SerenityChannelId, GuildId as SerenityGuildId};
use songbird::error::JoinError as SongbirdJoinError;
use songbird::input::Input;
use songbird::{Call, Songbird};
use tokio::sync::Mutex;

use crate::session::{ChannelId, VoiceGateway};
use crate::voice::{AudioPlayer, GuildId, VoiceConnection};
use crate::{Error, Result};

/// A joined songbird call
pub struct SongbirdConnection {
    call: Arc<Mutex<Call>>,
}

impl SongbirdConnection {
    #[must_use]
    pub const fn new(call: Arc<Mutex<Call>>) -> Self {
        Self { call }
    }
}

impl VoiceConnection for SongbirdConnection {
    fn subscribe(&self) -> Arc<dyn AudioPlayer> {
        Arc::new(SongbirdPlayer {
            call: Arc::clone(&self.call),
        })
    }
}

/// Plays encoded audio through a call, replacing the current track
struct SongbirdPlayer {
    call: Arc<Mutex<Call>>,
}

#[async_trait]
impl AudioPlayer for SongbirdPlayer {
    async fn play(&self, audio: Vec<u8>) -> Result<()> {
        let mut call = self.call.lock().await;
        if call.current_connection().is_none() {
            return Err(Error::Voice("call is not connected".to_string()));
        }

        let _track = call.play_only_input(Input::from(audio));
        Ok(())
    }
}

/// Joins and leaves voice channels through the songbird manager
pub struct SongbirdGateway {
    manager: Arc<Songbird>,
}

impl SongbirdGateway {
    #[must_use]
    pub const fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>> {
        let call = self
            .manager
            .join(SerenityGuildId::new(guild_id), SerenityChannelId::new(channel_id))
            .await
            .map_err(|e| Error::Voice(format!("voice join failed: {e}")))?;

        Ok(Arc::new(SongbirdConnection::new(call)))
    }

    async fn leave(&self, guild_id: GuildId) -> Result<()> {
        match self.manager.remove(SerenityGuildId::new(guild_id)).await {
            Ok(()) | Err(SongbirdJoinError::NoCall) => Ok(()),
            Err(e) => Err(Error::Voice(format!("voice leave failed: {e}"))),
        }
    }
}
