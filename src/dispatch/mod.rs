//! Update dispatch module.
//!
//! Connects the Telegram update stream to the command handler.

mod runner;

pub use runner::{DispatchMessage, Dispatcher, respond};
