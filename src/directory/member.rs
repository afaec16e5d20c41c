//! Chat members and member snapshots.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::RetrievalStrategy;

/// Canonical chat identifier used throughout the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Platform user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chat participant as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: UserId,

    /// Unique handle without the leading `@`.
    pub handle: Option<String>,

    /// Display name, used when there is no handle.
    pub display_name: String,

    /// Bots and other automated accounts.
    pub is_automated: bool,
}

impl Member {
    /// Creates a human member without a handle.
    #[must_use]
    pub fn new(id: i64, display_name: impl Into<String>) -> Self {
        Self {
            id: UserId(id),
            handle: None,
            display_name: display_name.into(),
            is_automated: false,
        }
    }

    /// Sets the handle, stripping a leading `@`. Empty handles are dropped.
    #[must_use]
    pub fn with_handle(mut self, handle: impl AsRef<str>) -> Self {
        let handle = normalize_handle(handle.as_ref());
        self.handle = (!handle.is_empty()).then(|| handle.to_owned());
        self
    }

    /// Marks the member as an automated account.
    #[must_use]
    pub const fn automated(mut self) -> Self {
        self.is_automated = true;
        self
    }

    /// Case-insensitive handle comparison; a leading `@` in `query` is ignored.
    #[must_use]
    pub fn handle_matches(&self, query: &str) -> bool {
        let query = normalize_handle(query);
        !query.is_empty()
            && self
                .handle
                .as_deref()
                .is_some_and(|h| h.to_lowercase() == query.to_lowercase())
    }

    /// How the member is addressed in a reply: `@handle` or the display name.
    #[must_use]
    pub fn mention(&self) -> String {
        match &self.handle {
            Some(handle) => format!("@{handle}"),
            None if self.display_name.trim().is_empty() => format!("id{}", self.id),
            None => self.display_name.clone(),
        }
    }
}

fn normalize_handle(handle: &str) -> &str {
    let handle = handle.trim();
    handle.strip_prefix('@').unwrap_or(handle)
}

/// A chat's member list as captured at one point in time.
///
/// Only humans are kept; duplicates are collapsed keeping the first
/// occurrence, so order follows the platform's order.
#[derive(Debug, Clone)]
pub struct Snapshot {
    members: Vec<Member>,
    captured_at: Instant,
    captured_wall: DateTime<Utc>,
    source: RetrievalStrategy,
}

impl Snapshot {
    /// Captures a snapshot from raw platform output, dropping automated
    /// accounts and repeated ids.
    #[must_use]
    pub fn capture(raw: Vec<Member>, source: RetrievalStrategy) -> Self {
        let mut seen = HashSet::new();
        let members = raw
            .into_iter()
            .filter(|m| !m.is_automated)
            .filter(|m| seen.insert(m.id))
            .collect();

        Self {
            members,
            captured_at: Instant::now(),
            captured_wall: Utc::now(),
            source,
        }
    }

    #[must_use]
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Monotonic capture time.
    #[must_use]
    pub const fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Wall-clock capture time, for display.
    #[must_use]
    pub const fn captured_wall(&self) -> DateTime<Utc> {
        self.captured_wall
    }

    /// Strategy that produced this snapshot.
    #[must_use]
    pub const fn source(&self) -> RetrievalStrategy {
        self.source
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    /// A snapshot is stale once `ttl` has fully elapsed since capture.
    #[must_use]
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.age() >= ttl
    }

    #[must_use]
    pub fn find_by_handle(&self, handle: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.handle_matches(handle))
    }

    /// Uniformly random member, `None` if empty.
    pub fn pick_random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Member> {
        self.members.choose(rng)
    }
}
