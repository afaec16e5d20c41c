//! Configuration module for the diagnosis bot.
//!
//! Handles loading and validation of the word tables, the Telegram API
//! credentials and the tunable bot settings.

mod diagnoses;
mod settings;

pub use diagnoses::{LevelWords, SeverityTable, TableError};
pub use settings::{BotSettings, ConfigError, TelegramConfig};
