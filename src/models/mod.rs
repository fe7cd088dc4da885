//! Data Models
//!
//! Contains the typed records and configuration used throughout the bot.

pub mod records;
pub mod settings;

pub use records::*;
pub use settings::BotConfig;
