//! Anthranks: a spreadsheet-backed community rating bot.
//!
//! Durable state lives in an external spreadsheet; on every restart the bot
//! reconstructs its interactive UI state from that store (revival), then keeps
//! a periodically-recomputed aggregate view synchronized under rate-limited,
//! intermittently-failing network calls.

pub mod models;
pub mod services;
pub mod state;
pub mod utils;

pub use models::records::{CompiledScore, MetadataRecord, RatingCategory, VoteRecord};
pub use models::settings::BotConfig;
pub use state::BotContext;
pub use utils::error::{BotError, BotResult};
