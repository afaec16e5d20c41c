//! Update dispatcher.
//!
//! Every new message is handled on its own task so a slow member refresh
//! (or a flood wait) in one chat never holds up the others:
//! 1. Convert the update and remember the chat and sender
//! 2. Parse and execute the command, if it is one
//! 3. Send the reply back to the originating chat

use std::sync::Arc;

use grammers_client::UpdatesConfiguration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::commands::CommandHandler;
use crate::platform::{ChatPlatform, IncomingMessage};
use crate::telegram::{RawUpdatesReceiver, TelegramBot, Update};

/// Messages that can be sent to the dispatcher.
#[derive(Debug, Clone)]
pub enum DispatchMessage {
    /// Stop reading updates.
    Shutdown,
}

/// Reads Telegram updates and feeds them to the command handler.
pub struct Dispatcher {
    /// Telegram bot client.
    bot: Arc<TelegramBot>,

    /// Shared command handler.
    handler: Arc<CommandHandler>,
}

impl Dispatcher {
    /// Creates a new dispatcher.
    #[must_use]
    pub const fn new(bot: Arc<TelegramBot>, handler: Arc<CommandHandler>) -> Self {
        Self { bot, handler }
    }

    /// Runs the update loop until shutdown or until the stream fails.
    pub async fn run(&self, updates: RawUpdatesReceiver, mut rx: mpsc::Receiver<DispatchMessage>) {
        info!("Dispatcher started");

        let mut stream = self.bot.inner().stream_updates(
            updates,
            UpdatesConfiguration {
                catch_up: false,
                ..Default::default()
            },
        );

        loop {
            tokio::select! {
                update = stream.next() => {
                    match update {
                        Ok(Update::NewMessage(message)) => {
                            let bot = Arc::clone(&self.bot);
                            let handler = Arc::clone(&self.handler);
                            tokio::spawn(async move {
                                if let Some(incoming) = bot.incoming(&message).await {
                                    respond(&handler, bot.as_ref(), &incoming).await;
                                }
                            });
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!("Update stream failed: {}", e);
                            break;
                        }
                    }
                }
                msg = rx.recv() => {
                    match msg {
                        Some(DispatchMessage::Shutdown) | None => {
                            info!("Dispatcher shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

/// Runs one message through the handler and sends the reply.
///
/// Returns whether the message was a command for this bot.
pub async fn respond<P: ChatPlatform>(handler: &CommandHandler, platform: &P, message: &IncomingMessage) -> bool {
    let Some(result) = handler.try_handle(platform, message).await else {
        return false;
    };

    if let Err(e) = platform.send_message(message.chat_id, &result.message).await {
        error!(chat_id = %message.chat_id, "Failed to send reply: {}", e);
    } else {
        debug!(chat_id = %message.chat_id, success = result.success, "Reply sent");
    }
    true
}
