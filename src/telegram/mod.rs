//! Telegram client wrapper module.
//!
//! Adapts grammers to the [`ChatPlatform`](crate::platform::ChatPlatform)
//! interface and translates Telegram peers to canonical chat ids.

mod client;
mod lock;

pub use client::{RawUpdatesReceiver, TelegramBot, TelegramError};
pub use grammers_client::update::Update;
pub use lock::{InstanceLock, LockError};
