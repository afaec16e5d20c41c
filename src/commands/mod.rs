//! Command handling module.
//!
//! Parses chat commands (`/diagnose`, `/refresh`, ...) and turns them into
//! replies using the member directory and the diagnosis composer.

mod handler;
mod types;

pub use handler::{CommandHandler, Subject, SubjectSource};
pub use types::{BotCommand, CommandResult, DiagnoseArgs};
