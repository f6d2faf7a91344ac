//! grouch - a grumpy Discord voice bot
//!
//! This library provides the pieces of the bot:
//! - Utterance capture from per-speaker voice streams
//! - Wake word matching, STT and TTS clients
//! - Persona replies via chat completions
//! - Per-guild playback sessions and the Discord surface
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      Discord                         │
//! │   /panel  │  join_voice  │  "<ww>, ..."  │  voice rx │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                     Pipeline                         │
//! │  capture → STT → wake word → dialogue → TTS → play   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Remote services                      │
//! │        Gladia (STT/TTS)  │  OpenAI (chat)            │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod channels;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
