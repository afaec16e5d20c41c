//! Chat member directory.
//!
//! Keeps one snapshot of human members per chat and refreshes it through
//! an ordered list of retrieval strategies once it goes stale, so that
//! commands do not hit the platform API every time.

mod backoff;
mod member;
mod service;
mod store;
mod strategy;

pub use backoff::FloodBackoff;
pub use member::{ChatId, Member, Snapshot, UserId};
pub use service::{MemberDirectory, RetrievalError};
pub use store::SnapshotStore;
pub use strategy::{FallbackPolicy, PolicyError, RetrievalStrategy};
