//! Chat platform adapters
//!
//! Discord is the only surface: slash command and button to join voice,
//! typed wake-word requests, and voice receive.

pub mod discord;

pub use discord::DiscordBot;
