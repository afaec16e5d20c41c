//! Telegram client wrapper implementing [`ChatPlatform`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use grammers_client::types::Message;
use grammers_client::types::peer::Peer;
use grammers_client::types::User;
use grammers_client::{sender, Client, InvocationError, SenderPool, SignInError};
use grammers_session::storages::SqliteSession;
use grammers_tl_types as tl;
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::TelegramConfig;
use crate::directory::{ChatId, Member, UserId};
use crate::platform::{ChatPlatform, IncomingMessage, MessageId, PlatformError};

/// Receiver of raw updates handed out by [`TelegramBot::connect`].
pub type RawUpdatesReceiver =
    tokio::sync::mpsc::UnboundedReceiver<grammers_session::updates::UpdatesLike>;

/// Offset between Bot API channel ids and bare MTProto channel ids.
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// Errors that can occur during Telegram operations.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Not authorized. Please sign in first.")]
    NotAuthorized,

    #[error("Sign in failed: {0}")]
    SignInFailed(String),

    #[error("Flood wait required: {0} seconds")]
    FloodWait(u32),

    #[error("Missing rights: {0}")]
    Forbidden(String),

    #[error("Chat {0} has not been seen yet")]
    UnknownChat(ChatId),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("API invocation error: {0}")]
    Invocation(String),
}

/// RPC errors meaning the bot lacks rights rather than the call failing.
const PERMISSION_ERRORS: [&str; 6] = [
    "CHAT_ADMIN_REQUIRED",
    "CHANNEL_PRIVATE",
    "USER_NOT_PARTICIPANT",
    "BOT_METHOD_INVALID",
    "CHAT_WRITE_FORBIDDEN",
    "USER_BANNED_IN_CHANNEL",
];

impl From<InvocationError> for TelegramError {
    fn from(err: InvocationError) -> Self {
        let err_str = err.to_string();

        // Check for flood wait errors
        if (err_str.contains("FLOOD_WAIT") || err_str.contains("flood"))
            && let Some(seconds) = extract_flood_wait_seconds(&err_str)
        {
            return Self::FloodWait(seconds);
        }

        if PERMISSION_ERRORS.iter().any(|name| err_str.contains(name)) {
            return Self::Forbidden(err_str);
        }

        Self::Invocation(err_str)
    }
}

impl From<TelegramError> for PlatformError {
    fn from(err: TelegramError) -> Self {
        match err {
            TelegramError::FloodWait(seconds) => Self::RateLimited {
                retry_after: Duration::from_secs(u64::from(seconds)),
            },
            TelegramError::Forbidden(reason) => Self::PermissionDenied(reason),
            TelegramError::NotAuthorized => Self::PermissionDenied("not authorized".to_owned()),
            TelegramError::UnknownChat(chat) => Self::UnknownChat(chat),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Extracts flood wait seconds from an error message.
fn extract_flood_wait_seconds(err_msg: &str) -> Option<u32> {
    let patterns = ["flood_wait_", "flood wait "];
    let lowered = err_msg.to_ascii_lowercase();

    for pattern in patterns {
        if let Some(idx) = lowered.find(pattern) {
            let start = idx + pattern.len();
            let num_str: String = lowered[start..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if let Ok(seconds) = num_str.parse() {
                return Some(seconds);
            }
        }
    }
    None
}

/// Canonical chat id for a peer, in Bot API form.
///
/// Users keep their id, basic groups are negated, channels and
/// supergroups get the `-100` prefix.
fn chat_id_of(peer: &Peer) -> ChatId {
    match peer {
        Peer::User(user) => ChatId(user.bare_id()),
        Peer::Group(group) => ChatId(-group.bare_id()),
        Peer::Channel(channel) => ChatId(-CHANNEL_ID_OFFSET - channel.bare_id()),
    }
}

fn member_of(user: &User) -> Member {
    let member = Member {
        id: UserId(user.bare_id()),
        handle: None,
        display_name: user.full_name(),
        is_automated: user.is_bot(),
    };
    match user.username() {
        Some(handle) => member.with_handle(handle),
        None => member,
    }
}

fn member_of_raw(user: &tl::enums::User) -> Option<Member> {
    let tl::enums::User::User(user) = user else {
        return None;
    };

    let display_name = [user.first_name.as_deref(), user.last_name.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

    let member = Member {
        id: UserId(user.id),
        handle: None,
        display_name,
        is_automated: user.bot,
    };
    Some(match &user.username {
        Some(handle) => member.with_handle(handle),
        None => member,
    })
}

/// High-level Telegram client wrapper.
pub struct TelegramBot {
    /// The underlying grammers client.
    client: Client,

    /// Handle to the sender pool for disconnection.
    handle: sender::SenderPoolHandle,

    /// Peers seen in updates, needed to address chats by canonical id.
    peers: RwLock<HashMap<ChatId, Peer>>,

    /// Recent message senders per chat, newest first.
    recent: Mutex<HashMap<ChatId, VecDeque<Member>>>,

    /// How many senders are remembered per chat.
    recent_capacity: usize,

    /// The bot's own account, fetched once.
    me: OnceCell<Member>,

    /// Background task running the sender pool.
    _pool_task: JoinHandle<()>,
}

impl TelegramBot {
    /// Connects to Telegram with the given configuration.
    ///
    /// Returns the bot and the receiver of raw updates for the dispatcher.
    pub async fn connect(
        config: &TelegramConfig,
        recent_capacity: usize,
    ) -> Result<(Self, RawUpdatesReceiver), TelegramError> {
        info!("Connecting to Telegram...");

        let session = Arc::new(
            SqliteSession::open(&config.session_path)
                .await
                .map_err(|e| TelegramError::Session(e.to_string()))?,
        );

        let SenderPool {
            runner,
            updates,
            handle,
        } = SenderPool::new(Arc::clone(&session), config.api_id);

        let client = Client::new(handle.clone());

        // Spawn the sender pool runner
        let pool_task = tokio::spawn(async move {
            runner.run().await;
        });

        let is_authorized = client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()))?;

        info!("Connected to Telegram. Authorized: {}", is_authorized);

        let bot = Self {
            client,
            handle: handle.thin,
            peers: RwLock::new(HashMap::new()),
            recent: Mutex::new(HashMap::new()),
            recent_capacity: recent_capacity.max(1),
            me: OnceCell::new(),
            _pool_task: pool_task,
        };

        if !is_authorized {
            bot.sign_in(config).await?;
        }

        Ok((bot, updates))
    }

    /// Signs in with the bot token.
    async fn sign_in(&self, config: &TelegramConfig) -> Result<(), TelegramError> {
        info!("Signing in with bot token...");

        match self.client.bot_sign_in(&config.bot_token, &config.api_hash).await {
            Ok(user) => {
                info!("Signed in as {}", member_of(&user).mention());
                Ok(())
            }
            Err(SignInError::Other(e)) => Err(e.into()),
            Err(e) => Err(TelegramError::SignInFailed(e.to_string())),
        }
    }

    /// Returns a reference to the underlying client for update streaming.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Converts a new message into the core's view of it without any
    /// network calls.
    ///
    /// Remembers the chat's peer and the sender as side effects. Returns
    /// `None` for outgoing, service or text-less messages.
    pub async fn incoming(&self, message: &Message) -> Option<IncomingMessage> {
        if message.outgoing() || message.text().is_empty() {
            return None;
        }

        let peer = message.peer()?;
        let chat_id = chat_id_of(peer);
        self.peers.write().await.insert(chat_id, peer.clone());

        let Some(Peer::User(user)) = message.sender() else {
            debug!(chat_id = %chat_id, "Ignoring message without a user sender");
            return None;
        };
        let sender = member_of(user);
        self.remember_sender(chat_id, sender.clone()).await;

        Some(IncomingMessage {
            chat_id,
            text: message.text().to_owned(),
            sender,
            reply_to: message.reply_to_message_id(),
        })
    }

    async fn remember_sender(&self, chat: ChatId, sender: Member) {
        let mut recent = self.recent.lock().await;
        let senders = recent.entry(chat).or_default();
        senders.push_front(sender);
        senders.truncate(self.recent_capacity);
    }

    async fn peer(&self, chat: ChatId) -> Result<Peer, TelegramError> {
        self.peers
            .read()
            .await
            .get(&chat)
            .cloned()
            .ok_or(TelegramError::UnknownChat(chat))
    }

    async fn fetch_members(&self, chat: ChatId) -> Result<Vec<Member>, TelegramError> {
        let peer = self.peer(chat).await?;
        let mut members = Vec::new();

        let mut participants = self.client.iter_participants(&peer);
        while let Some(participant) = participants.next().await? {
            members.push(member_of(&participant.user));
        }

        debug!(chat_id = %chat, count = members.len(), "Enumerated participants");
        Ok(members)
    }

    async fn fetch_administrators(&self, chat: ChatId) -> Result<Vec<Member>, TelegramError> {
        let peer = self.peer(chat).await?;

        let users = match &peer {
            Peer::Channel(channel) => {
                let request = tl::functions::channels::GetParticipants {
                    channel: tl::types::InputChannel {
                        channel_id: channel.raw.id,
                        access_hash: channel.raw.access_hash.unwrap_or_default(),
                    }
                    .into(),
                    filter: tl::enums::ChannelParticipantsFilter::ChannelParticipantsAdmins,
                    offset: 0,
                    limit: 200,
                    hash: 0,
                };
                match self.client.invoke(&request).await? {
                    tl::enums::channels::ChannelParticipants::Participants(p) => p.users,
                    tl::enums::channels::ChannelParticipants::NotModified => Vec::new(),
                }
            }
            Peer::Group(group) => {
                let request = tl::functions::messages::GetFullChat {
                    chat_id: group.bare_id(),
                };
                let tl::enums::messages::ChatFull::Full(full) = self.client.invoke(&request).await?;
                let admin_ids = admin_ids_of(&full.full_chat);
                full.users
                    .into_iter()
                    .filter(|u| matches!(u, tl::enums::User::User(raw) if admin_ids.contains(&raw.id)))
                    .collect()
            }
            Peer::User(_) => Vec::new(),
        };

        Ok(users.iter().filter_map(member_of_raw).collect())
    }

    async fn fetch_recent_senders(&self, chat: ChatId, limit: usize) -> Result<Vec<Member>, TelegramError> {
        {
            let recent = self.recent.lock().await;
            if let Some(seen) = recent.get(&chat).filter(|s| !s.is_empty()) {
                return Ok(seen.iter().take(limit).cloned().collect());
            }
        }

        // Nothing observed yet; only user accounts may read history.
        let peer = self.peer(chat).await?;
        let mut senders = Vec::new();
        let mut messages = self.client.iter_messages(&peer).limit(limit);
        while let Some(message) = messages.next().await? {
            if let Some(Peer::User(user)) = message.sender() {
                senders.push(member_of(user));
            }
        }
        Ok(senders)
    }

    async fn fetch_author(&self, chat: ChatId, message_id: MessageId) -> Result<Option<Member>, TelegramError> {
        let peer = self.peer(chat).await?;
        let messages = self.client.get_messages_by_id(&peer, &[message_id]).await?;

        Ok(messages
            .into_iter()
            .flatten()
            .next()
            .and_then(|message| match message.sender() {
                Some(Peer::User(user)) => Some(member_of(user)),
                _ => None,
            }))
    }

    async fn fetch_me(&self) -> Result<Member, TelegramError> {
        let me = self
            .me
            .get_or_try_init(|| async {
                let user = self.client.get_me().await?;
                Ok::<_, TelegramError>(member_of(&user))
            })
            .await?;
        Ok(me.clone())
    }

    async fn send_text(&self, chat: ChatId, text: &str) -> Result<(), TelegramError> {
        let peer = self.peer(chat).await?;
        debug!(chat_id = %chat, "Sending: \"{}\"", truncate_for_log(text, 40));
        self.client.send_message(&peer, text).await?;
        Ok(())
    }

    /// Disconnects from Telegram.
    pub fn disconnect(&self) {
        info!("Disconnecting from Telegram...");
        self.handle.quit();
    }
}

/// User ids holding admin or creator rights in a basic group.
fn admin_ids_of(full_chat: &tl::enums::ChatFull) -> Vec<i64> {
    let tl::enums::ChatFull::Full(chat) = full_chat else {
        return Vec::new();
    };
    let tl::enums::ChatParticipants::Participants(list) = &chat.participants else {
        return Vec::new();
    };

    list.participants
        .iter()
        .filter_map(|p| match p {
            tl::enums::ChatParticipant::Admin(admin) => Some(admin.user_id),
            tl::enums::ChatParticipant::Creator(creator) => Some(creator.user_id),
            tl::enums::ChatParticipant::Participant(_) => None,
        })
        .collect()
}

impl ChatPlatform for TelegramBot {
    async fn list_members(&self, chat: ChatId) -> Result<Vec<Member>, PlatformError> {
        Ok(self.fetch_members(chat).await?)
    }

    async fn list_administrators(&self, chat: ChatId) -> Result<Vec<Member>, PlatformError> {
        Ok(self.fetch_administrators(chat).await?)
    }

    async fn recent_senders(&self, chat: ChatId, limit: usize) -> Result<Vec<Member>, PlatformError> {
        Ok(self.fetch_recent_senders(chat, limit).await?)
    }

    async fn message_author(&self, chat: ChatId, message: MessageId) -> Result<Option<Member>, PlatformError> {
        Ok(self.fetch_author(chat, message).await?)
    }

    async fn bot_identity(&self) -> Result<Member, PlatformError> {
        Ok(self.fetch_me().await?)
    }

    async fn send_message(&self, chat: ChatId, text: &str) -> Result<(), PlatformError> {
        Ok(self.send_text(chat, text).await?)
    }
}

impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot")
            .field("recent_capacity", &self.recent_capacity)
            .finish_non_exhaustive()
    }
}

/// Truncates a string for logging purposes.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_owned()
    } else {
        format!("{}...", s.chars().take(max_len).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("Hello", 10), "Hello");
        assert_eq!(truncate_for_log("Hello, World!", 5), "Hello...");
    }

    #[test]
    fn test_extract_flood_wait() {
        assert_eq!(extract_flood_wait_seconds("FLOOD_WAIT_120"), Some(120));
        assert_eq!(extract_flood_wait_seconds("flood wait 60 seconds"), Some(60));
        assert_eq!(extract_flood_wait_seconds("some other error"), None);
    }

    #[test]
    fn test_extract_flood_wait_non_ascii() {
        assert_eq!(extract_flood_wait_seconds("İ flood wait é5"), None);
        assert_eq!(extract_flood_wait_seconds("İstanbul: FLOOD_WAIT_17"), Some(17));
        assert_eq!(extract_flood_wait_seconds("ошибка: flood wait 9"), Some(9));
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            PlatformError::from(TelegramError::FloodWait(42)),
            PlatformError::RateLimited {
                retry_after: Duration::from_secs(42)
            }
        );
        assert!(matches!(
            PlatformError::from(TelegramError::Forbidden("CHAT_ADMIN_REQUIRED".to_owned())),
            PlatformError::PermissionDenied(_)
        ));
        assert_eq!(
            PlatformError::from(TelegramError::UnknownChat(ChatId(-5))),
            PlatformError::UnknownChat(ChatId(-5))
        );
        assert!(matches!(
            PlatformError::from(TelegramError::Connection("reset".to_owned())),
            PlatformError::Transport(_)
        ));
    }
}
