//! Utilities
//!
//! Common utilities used throughout the bot.

pub mod error;

pub use error::*;
