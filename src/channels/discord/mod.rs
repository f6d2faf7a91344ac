//! Discord bot using serenity and songbird
//!
//! Handles the `panel` slash command, the `join_voice` button, the typed
//! wake-word trigger, and the bot's own voice state.

mod connection;
mod receiver;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serenity::Client;
use serenity::all::{
    ButtonStyle, ChannelId as SerenityChannelId, ComponentInteraction, Context, CreateActionRow,
    CreateButton, CreateCommand, CreateInteractionResponse, CreateInteractionResponseMessage,
    EditInteractionResponse, EventHandler, GatewayIntents, GuildId as SerenityGuildId, Interaction,
    Message, Ready, UserId, VoiceState,
};
use songbird::driver::DecodeMode;
use songbird::serenity::SerenityInit;
use songbird::{Call, Songbird};
use tokio::sync::Mutex;

pub use connection::{SongbirdConnection, SongbirdGateway};
pub use receiver::VoiceReceiver;

use crate::config::Config;
use crate::pipeline::{Pipeline, TextOutcome};
use crate::session::{JoinError, ReceiverTracker, SessionManager};
use crate::voice::{GuildId, PlayerRegistry, WakeWord};
use crate::{Error, Result};

/// Slash command that shows the voice panel
pub const PANEL_COMMAND: &str = "panel";

/// Custom id of the join button
pub const JOIN_BUTTON_ID: &str = "join_voice";

/// How often idle sessions are swept
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// User-facing replies
pub mod replies {
    use crate::voice::WakeWord;

    pub const PANEL: &str = "Управление голосом";
    pub const PANEL_DESCRIPTION: &str = "Панель управления голосом (кнопка Join)";
    pub const JOIN_BUTTON_LABEL: &str = "Join voice";
    pub const NOT_IN_VOICE: &str = "Зайдите в голосовой канал.";
    pub const JOIN_FAILED: &str = "Не удалось подключиться к голосу (шифрование/регион). Попробуйте другой голосовой канал или регион.";
    pub const DIALOGUE_FAILED: &str = "Ну вот, OpenAI опять в астрале. Потом попробуй.";
    pub const SYNTHESIS_FAILED: &str = "Голос сорвался. Попробую позже.";
    pub const PLAYED_REACTION: char = '🔊';

    /// Confirmation after joining `channel`
    #[must_use]
    pub fn joined(channel: &str, wake_word: &WakeWord) -> String {
        format!(
            "Зашёл в: {channel}. В текстовом канале напишите: \"{wake_word}, скажи тест\""
        )
    }

    /// Reply to a typed request while the bot is not in voice
    #[must_use]
    pub fn bot_not_in_voice(wake_word: &WakeWord) -> String {
        format!(
            "Я не в голосовом канале. Вызови /panel и нажми Join, потом напиши \"{wake_word}, ...\""
        )
    }
}

/// The Discord bot: gateway client plus voice sessions
pub struct DiscordBot {
    token: String,
    handler: Handler,
    songbird: Arc<Songbird>,
}

impl DiscordBot {
    /// Wire the bot from resolved configuration
    ///
    /// # Errors
    ///
    /// Returns error if the Discord token is missing
    pub fn new(config: &Config) -> Result<Self> {
        let token = config.require_discord_token()?.to_string();

        let songbird = Songbird::serenity_from_config(
            songbird::Config::default().decode_mode(DecodeMode::Decode),
        );

        let players = Arc::new(PlayerRegistry::new());
        let pipeline = Arc::new(Pipeline::from_config(config, Arc::clone(&players)));
        let sessions = Arc::new(SessionManager::new(
            Arc::new(SongbirdGateway::new(Arc::clone(&songbird))),
            players,
            config.voice.join_timeout,
        ));

        let handler = Handler {
            pipeline,
            sessions,
            songbird: Arc::clone(&songbird),
            receivers: ReceiverTracker::new(),
            silence: config.voice.silence,
            session_idle: config.voice.session_idle,
        };

        Ok(Self {
            token,
            handler,
            songbird,
        })
    }

    /// Connect to the gateway and run until the client stops
    ///
    /// # Errors
    ///
    /// Returns error if the client cannot be built or the gateway fails
    pub async fn run(self) -> Result<()> {
        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
            | GatewayIntents::GUILD_VOICE_STATES;

        tokio::spawn(sweep_idle_sessions(
            Arc::clone(&self.handler.sessions),
            self.handler.session_idle,
        ));

        let mut client = Client::builder(&self.token, intents)
            .event_handler(self.handler)
            .register_songbird_with(self.songbird)
            .await
            .map_err(|e| Error::Discord(format!("Discord client error: {e}")))?;

        tracing::info!("starting Discord client");
        client.start().await?;
        Ok(())
    }
}

async fn sweep_idle_sessions(sessions: Arc<SessionManager>, idle: Duration) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        let left = sessions.sweep_idle(Instant::now(), idle).await;
        if !left.is_empty() {
            tracing::info!(guilds = ?left, "left idle voice channels");
        }
    }
}

/// Discord event handler
struct Handler {
    pipeline: Arc<Pipeline>,
    sessions: Arc<SessionManager>,
    songbird: Arc<Songbird>,
    receivers: ReceiverTracker<Mutex<Call>>,
    silence: Duration,
    session_idle: Duration,
}

impl Handler {
    fn wake_word(&self) -> &WakeWord {
        self.pipeline.wake_word()
    }

    async fn handle_join(&self, ctx: &Context, component: &ComponentInteraction) {
        if let Err(e) = component.defer_ephemeral(&ctx.http).await {
            tracing::warn!(error = %e, "failed to defer join interaction");
            return;
        }

        let reply = match component.guild_id {
            Some(guild_id) => self.join_user_channel(ctx, guild_id, component.user.id).await,
            None => replies::NOT_IN_VOICE.to_string(),
        };

        if let Err(e) = component
            .edit_response(&ctx.http, EditInteractionResponse::new().content(reply))
            .await
        {
            tracing::warn!(error = %e, "failed to answer join interaction");
        }
    }

    async fn join_user_channel(
        &self,
        ctx: &Context,
        guild_id: SerenityGuildId,
        user_id: UserId,
    ) -> String {
        let user_channel = ctx.cache.guild(guild_id).and_then(|guild| {
            guild
                .voice_states
                .get(&user_id)
                .and_then(|state| state.channel_id)
        });

        let outcome = match self
            .sessions
            .join(guild_id.get(), user_channel.map(SerenityChannelId::get))
            .await
        {
            Ok(outcome) => outcome,
            Err(JoinError::NotInVoice) => return replies::NOT_IN_VOICE.to_string(),
            Err(JoinError::NotReady(reason)) => {
                tracing::warn!(guild_id = guild_id.get(), reason = %reason, "join abandoned");
                return replies::JOIN_FAILED.to_string();
            }
        };

        self.attach_receiver(guild_id).await;

        let channel_name = user_channel
            .and_then(|channel_id| {
                ctx.cache
                    .guild(guild_id)
                    .and_then(|guild| guild.channels.get(&channel_id).map(|c| c.name.clone()))
            })
            .unwrap_or_else(|| outcome.channel_id.to_string());

        replies::joined(&channel_name, self.wake_word())
    }

    /// Attach a receiver unless the current call already has one
    async fn attach_receiver(&self, guild_id: SerenityGuildId) {
        let Some(call) = self.songbird.get(guild_id) else {
            tracing::warn!(guild_id = guild_id.get(), "joined but call is missing");
            return;
        };
        if !self.receivers.needs_receiver(guild_id.get(), &call) {
            return;
        }

        let receiver =
            VoiceReceiver::start(guild_id.get(), self.silence, Arc::clone(&self.pipeline));
        receiver.attach(&mut *call.lock().await);
    }

    async fn handle_text_trigger(&self, ctx: &Context, msg: &Message, guild_id: GuildId) {
        let Some(query) = self.wake_word().strip_request(&msg.content) else {
            return;
        };

        tracing::debug!(guild_id, author = %msg.author.name, query, "text trigger");

        if !self.sessions.players().contains(guild_id).await {
            reply(ctx, msg, &replies::bot_not_in_voice(self.wake_word())).await;
            return;
        }

        match self.pipeline.handle_text(guild_id, query).await {
            TextOutcome::Played { .. } => {
                if let Err(e) = msg.react(&ctx.http, replies::PLAYED_REACTION).await {
                    tracing::warn!(error = %e, "failed to react to message");
                }
            }
            TextOutcome::DialogueFailed => reply(ctx, msg, replies::DIALOGUE_FAILED).await,
            TextOutcome::SynthesisFailed | TextOutcome::PlaybackFailed => {
                reply(ctx, msg, replies::SYNTHESIS_FAILED).await;
            }
        }
    }
}

async fn reply(ctx: &Context, msg: &Message, content: &str) {
    if let Err(e) = msg.reply(&ctx.http, content).await {
        tracing::warn!(error = %e, "failed to send Discord reply");
    }
}

fn panel_command() -> CreateCommand {
    CreateCommand::new(PANEL_COMMAND).description(replies::PANEL_DESCRIPTION)
}

fn panel_message() -> CreateInteractionResponseMessage {
    CreateInteractionResponseMessage::new()
        .content(replies::PANEL)
        .ephemeral(true)
        .components(vec![CreateActionRow::Buttons(vec![
            CreateButton::new(JOIN_BUTTON_ID)
                .label(replies::JOIN_BUTTON_LABEL)
                .style(ButtonStyle::Success),
        ])])
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!(user = %ready.user.name, guilds = ready.guilds.len(), "Discord bot ready");

        for guild in &ready.guilds {
            if let Err(e) = guild.id.set_commands(&ctx.http, vec![panel_command()]).await {
                tracing::warn!(
                    guild_id = guild.id.get(),
                    error = %e,
                    "failed to register commands"
                );
            }
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) if command.data.name == PANEL_COMMAND => {
                let response = CreateInteractionResponse::Message(panel_message());
                if let Err(e) = command.create_response(&ctx.http, response).await {
                    tracing::warn!(error = %e, "failed to answer panel command");
                }
            }
            Interaction::Component(component) if component.data.custom_id == JOIN_BUTTON_ID => {
                self.handle_join(&ctx, &component).await;
            }
            _ => {}
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };

        self.handle_text_trigger(&ctx, &msg, guild_id.get()).await;
    }

    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        let me = ctx.cache.current_user().id;
        if new.user_id != me || new.channel_id.is_some() {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };

        tracing::info!(guild_id = guild_id.get(), "bot left voice, dropping session");
        self.receivers.forget(guild_id.get());
        if let Err(e) = self.sessions.leave(guild_id.get()).await {
            tracing::debug!(guild_id = guild_id.get(), error = %e, "leave after disconnect failed");
        }
    }
}
