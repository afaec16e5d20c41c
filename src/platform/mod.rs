//! The chat platform as seen by the bot core.
//!
//! The core never talks to Telegram directly. Everything it needs from the
//! platform goes through [`ChatPlatform`], which the Telegram adapter
//! implements and tests replace with a scripted fake.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::directory::{ChatId, Member};

#[cfg(test)]
pub(crate) mod fake;

/// Errors reported by a platform call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Rate limited, retry after {} seconds", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("Call timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("Unknown chat: {0}")]
    UnknownChat(ChatId),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// A new text message addressed to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub text: String,
    pub sender: Member,
    /// Id of the message this one replies to, if any.
    ///
    /// Its author is only looked up when a command needs it.
    pub reply_to: Option<MessageId>,
}

/// Platform message id, unique within a chat.
pub type MessageId = i32;

/// Capabilities the bot needs from the chat platform.
///
/// Member lists are returned unfiltered; automated accounts are removed
/// by the directory at capture time.
pub trait ChatPlatform: Send + Sync {
    /// Enumerates every member of the chat.
    fn list_members(&self, chat: ChatId) -> impl Future<Output = Result<Vec<Member>, PlatformError>> + Send;

    /// Enumerates the chat's administrators.
    fn list_administrators(
        &self,
        chat: ChatId,
    ) -> impl Future<Output = Result<Vec<Member>, PlatformError>> + Send;

    /// Senders of the last `limit` messages, newest first, repeats included.
    fn recent_senders(
        &self,
        chat: ChatId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Member>, PlatformError>> + Send;

    /// Author of a message in the chat, `None` if it is gone or not a user.
    fn message_author(
        &self,
        chat: ChatId,
        message: MessageId,
    ) -> impl Future<Output = Result<Option<Member>, PlatformError>> + Send;

    /// The bot's own account.
    fn bot_identity(&self) -> impl Future<Output = Result<Member, PlatformError>> + Send;

    /// Sends a plain-text message to the chat.
    fn send_message(&self, chat: ChatId, text: &str) -> impl Future<Output = Result<(), PlatformError>> + Send;
}

/// Runs a platform call with an upper time bound.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, PlatformError>
where
    F: Future<Output = Result<T, PlatformError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| PlatformError::Timeout(limit))?
}
