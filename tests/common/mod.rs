//! Shared test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use grouch::dialogue::Responder;
use grouch::pipeline::Pipeline;
use grouch::session::{ChannelId, VoiceGateway};
use grouch::voice::{
    AudioPlayer, GuildId, PlayerRegistry, Synthesizer, Transcriber, VoiceConnection, WakeWord,
};
use grouch::{Error, Result};

/// Transcriber returning a fixed result
pub struct ScriptedTranscriber {
    result: std::result::Result<String, String>,
    pub calls: AtomicUsize,
}

impl ScriptedTranscriber {
    pub fn ok(text: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            result: Err("503 upstream".to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _audio: &[u8]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone().map_err(Error::Stt)
    }
}

/// Responder returning a fixed result and recording prompts
pub struct ScriptedResponder {
    result: std::result::Result<String, String>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedResponder {
    pub fn ok(text: &str) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            result: Err("500 internal".to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn reply(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.result.clone().map_err(Error::Dialogue)
    }
}

/// Synthesizer returning a fixed result and recording texts
pub struct ScriptedSynthesizer {
    result: std::result::Result<Vec<u8>, String>,
    pub texts: Mutex<Vec<String>>,
}

impl ScriptedSynthesizer {
    pub fn ok(audio: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            result: Ok(audio.to_vec()),
            texts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            result: Err("429 rate limited".to_string()),
            texts: Mutex::new(Vec::new()),
        })
    }

    pub fn count(&self) -> usize {
        self.texts.lock().unwrap().len()
    }
}

#[async_trait]
impl Synthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        self.texts.lock().unwrap().push(text.to_string());
        self.result.clone().map_err(Error::Tts)
    }
}

/// Player recording every buffer it is asked to play
#[derive(Default)]
pub struct RecordingPlayer {
    pub played: Mutex<Vec<Vec<u8>>>,
}

#[async_trait]
impl AudioPlayer for RecordingPlayer {
    async fn play(&self, audio: Vec<u8>) -> Result<()> {
        self.played.lock().unwrap().push(audio);
        Ok(())
    }
}

/// Connection handing out one shared recording player
#[derive(Default)]
pub struct RecordingConnection {
    pub player: Arc<RecordingPlayer>,
    pub subscriptions: AtomicUsize,
}

impl RecordingConnection {
    pub fn played(&self) -> Vec<Vec<u8>> {
        self.player.played.lock().unwrap().clone()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

impl VoiceConnection for RecordingConnection {
    fn subscribe(&self) -> Arc<dyn AudioPlayer> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Arc::clone(&self.player) as Arc<dyn AudioPlayer>
    }
}

/// Player whose every playback fails
pub struct FailingPlayer;

#[async_trait]
impl AudioPlayer for FailingPlayer {
    async fn play(&self, _audio: Vec<u8>) -> Result<()> {
        Err(Error::Voice("call is not connected".to_string()))
    }
}

/// Connection handing out failing players
pub struct FailingConnection;

impl VoiceConnection for FailingConnection {
    fn subscribe(&self) -> Arc<dyn AudioPlayer> {
        Arc::new(FailingPlayer)
    }
}

/// How the mock gateway answers a join
#[derive(Clone, Copy)]
pub enum GatewayBehavior {
    Ready,
    Fail,
    Hang,
}

/// Voice gateway recording joins and leaves
pub struct MockGateway {
    behavior: Mutex<GatewayBehavior>,
    pub connection: Arc<RecordingConnection>,
    pub joins: Mutex<Vec<(GuildId, ChannelId)>>,
    pub leaves: Mutex<Vec<GuildId>>,
}

impl MockGateway {
    pub fn new(behavior: GatewayBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            connection: Arc::new(RecordingConnection::default()),
            joins: Mutex::new(Vec::new()),
            leaves: Mutex::new(Vec::new()),
        })
    }

    /// Change how later joins are answered
    pub fn set_behavior(&self, behavior: GatewayBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn join_count(&self) -> usize {
        self.joins.lock().unwrap().len()
    }

    pub fn left(&self) -> Vec<GuildId> {
        self.leaves.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoiceGateway for MockGateway {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn VoiceConnection>> {
        self.joins.lock().unwrap().push((guild_id, channel_id));
        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            GatewayBehavior::Ready => Ok(Arc::clone(&self.connection) as Arc<dyn VoiceConnection>),
            GatewayBehavior::Fail => Err(Error::Voice("encryption mode unsupported".to_string())),
            GatewayBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(Error::Voice("unreachable".to_string()))
            }
        }
    }

    async fn leave(&self, guild_id: GuildId) -> Result<()> {
        self.leaves.lock().unwrap().push(guild_id);
        Ok(())
    }
}

/// Build a pipeline over scripted collaborators with the default wake word
pub fn pipeline(
    transcriber: Arc<ScriptedTranscriber>,
    responder: Arc<ScriptedResponder>,
    synthesizer: Arc<ScriptedSynthesizer>,
) -> (Pipeline, Arc<PlayerRegistry>) {
    let players = Arc::new(PlayerRegistry::new());
    let pipeline = pipeline_with(Arc::clone(&players), transcriber, responder, synthesizer);
    (pipeline, players)
}

/// Build a pipeline sharing an existing player registry
pub fn pipeline_with(
    players: Arc<PlayerRegistry>,
    transcriber: Arc<ScriptedTranscriber>,
    responder: Arc<ScriptedResponder>,
    synthesizer: Arc<ScriptedSynthesizer>,
) -> Pipeline {
    Pipeline::new(
        transcriber,
        responder,
        synthesizer,
        players,
        WakeWord::new("бот"),
        8192,
    )
}

/// Register `guild_id`'s player on a fresh recording connection, as a join does
pub async fn joined(players: &PlayerRegistry, guild_id: GuildId) -> RecordingConnection {
    let connection = RecordingConnection::default();
    players.get_or_create(guild_id, &connection).await;
    connection
}
