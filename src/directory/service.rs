//! Member directory: cached snapshots with ranked refresh.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ChatId, FallbackPolicy, FloodBackoff, Member, RetrievalStrategy, Snapshot, SnapshotStore};
use crate::config::BotSettings;
use crate::platform::{ChatPlatform, PlatformError, with_timeout};

/// Why a refresh produced no snapshot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("Bot lacks permission to see chat members: {0}")]
    PermissionDenied(String),

    #[error("Rate limited by the platform (retry after {} seconds)", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("No members found by any retrieval strategy")]
    EmptyResult,

    #[error("Platform error: {0}")]
    Transport(String),
}

impl RetrievalError {
    /// Ranking used to report the most useful of several failures.
    const fn weight(&self) -> u8 {
        match self {
            Self::EmptyResult => 0,
            Self::Transport(_) => 1,
            Self::PermissionDenied(_) => 2,
            Self::RateLimited { .. } => 3,
        }
    }
}

impl From<PlatformError> for RetrievalError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::PermissionDenied(reason) => Self::PermissionDenied(reason),
            PlatformError::RateLimited { retry_after } => Self::RateLimited { retry_after },
            other @ (PlatformError::Timeout(_)
            | PlatformError::UnknownChat(_)
            | PlatformError::Transport(_)) => Self::Transport(other.to_string()),
        }
    }
}

/// Per-chat member snapshots, refreshed lazily once stale.
///
/// The directory owns its store; construct one per process (or per test)
/// and share it behind an `Arc`.
#[derive(Debug)]
pub struct MemberDirectory {
    store: SnapshotStore,

    /// Serializes refreshes of the same chat.
    refresh_locks: Mutex<HashMap<ChatId, Arc<Mutex<()>>>>,

    policy: FallbackPolicy,

    /// Freshness window.
    ttl: Duration,

    backoff: FloodBackoff,

    /// Upper bound for each platform call.
    call_timeout: Duration,
}

impl MemberDirectory {
    /// Creates a directory with the given strategy order and freshness window.
    #[must_use]
    pub fn new(policy: FallbackPolicy, ttl: Duration) -> Self {
        Self {
            store: SnapshotStore::new(),
            refresh_locks: Mutex::new(HashMap::new()),
            policy,
            ttl,
            backoff: FloodBackoff::default(),
            call_timeout: Duration::from_secs(30),
        }
    }

    /// Creates a directory configured from bot settings.
    #[must_use]
    pub fn from_settings(settings: &BotSettings) -> Self {
        Self::new(settings.fallback_policy.clone(), settings.snapshot_ttl())
            .with_backoff(FloodBackoff::new(settings.rate_limit_cap()))
            .with_call_timeout(settings.platform_timeout())
    }

    #[must_use]
    pub const fn with_backoff(mut self, backoff: FloodBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Upper bound for each platform call.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    #[must_use]
    pub const fn policy(&self) -> &FallbackPolicy {
        &self.policy
    }

    /// The cached snapshot, without refreshing.
    pub async fn get_snapshot(&self, chat: ChatId) -> Option<Arc<Snapshot>> {
        self.store.get(chat).await
    }

    /// A snapshot that is fresh as of this call.
    ///
    /// Without `force`, a cached snapshot inside the freshness window is
    /// returned as is and the platform is not contacted.
    pub async fn ensure_fresh<P: ChatPlatform>(
        &self,
        chat: ChatId,
        platform: &P,
        force: bool,
    ) -> Result<Arc<Snapshot>, RetrievalError> {
        if !force && let Some(snapshot) = self.fresh_snapshot(chat).await {
            debug!(chat_id = %chat, age_secs = snapshot.age().as_secs(), "Using cached snapshot");
            return Ok(snapshot);
        }

        let lock = self.refresh_lock(chat).await;
        let _guard = lock.lock().await;

        // Another task may have refreshed while we waited for the lock.
        if !force && let Some(snapshot) = self.fresh_snapshot(chat).await {
            return Ok(snapshot);
        }

        self.refresh(chat, platform).await
    }

    /// Uniformly random member of the cached snapshot.
    pub async fn pick_random<R: Rng + ?Sized>(&self, chat: ChatId, rng: &mut R) -> Option<Member> {
        let snapshot = self.store.get(chat).await?;
        snapshot.pick_random(rng).cloned()
    }

    /// Case-insensitive handle lookup in the cached snapshot.
    pub async fn find_by_handle(&self, chat: ChatId, handle: &str) -> Option<Member> {
        let snapshot = self.store.get(chat).await?;
        snapshot.find_by_handle(handle).cloned()
    }

    /// Drops the cached snapshot so the next lookup refreshes.
    pub async fn invalidate(&self, chat: ChatId) -> bool {
        self.refresh_locks.lock().await.remove(&chat);
        self.store.remove(chat).await.is_some()
    }

    /// Number of chats with a cached snapshot.
    pub async fn len(&self) -> usize {
        self.store.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.store.is_empty().await
    }

    async fn fresh_snapshot(&self, chat: ChatId) -> Option<Arc<Snapshot>> {
        self.store
            .get(chat)
            .await
            .filter(|snapshot| !snapshot.is_stale(self.ttl))
    }

    async fn refresh_lock(&self, chat: ChatId) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        Arc::clone(locks.entry(chat).or_default())
    }

    /// Tries each strategy in policy order, stopping at the first one that
    /// yields at least one human member.
    ///
    /// The stored snapshot is only touched on success.
    async fn refresh<P: ChatPlatform>(&self, chat: ChatId, platform: &P) -> Result<Arc<Snapshot>, RetrievalError> {
        let mut worst = RetrievalError::EmptyResult;

        for &strategy in self.policy.strategies() {
            match self.run_strategy(strategy, chat, platform).await {
                Ok(raw) => {
                    let fetched = raw.len();
                    let snapshot = Snapshot::capture(raw, strategy);

                    if snapshot.is_empty() {
                        debug!(chat_id = %chat, %strategy, fetched, "Strategy found no human members");
                        continue;
                    }

                    info!(
                        chat_id = %chat,
                        %strategy,
                        members = snapshot.len(),
                        "Member snapshot refreshed"
                    );
                    return Ok(self.store.replace(chat, snapshot).await);
                }
                Err(PlatformError::RateLimited { retry_after }) => {
                    warn!(chat_id = %chat, %strategy, "Still rate limited after retry, giving up");
                    return Err(RetrievalError::RateLimited { retry_after });
                }
                Err(e) => {
                    warn!(chat_id = %chat, %strategy, error = %e, "Member retrieval strategy failed");
                    let err = RetrievalError::from(e);
                    if err.weight() > worst.weight() {
                        worst = err;
                    }
                }
            }
        }

        warn!(chat_id = %chat, error = %worst, "Refresh failed, keeping previous snapshot");
        Err(worst)
    }

    /// Runs one strategy, retrying once after a flood wait.
    async fn run_strategy<P: ChatPlatform>(
        &self,
        strategy: RetrievalStrategy,
        chat: ChatId,
        platform: &P,
    ) -> Result<Vec<Member>, PlatformError> {
        match self.call(strategy, chat, platform).await {
            Err(PlatformError::RateLimited { retry_after }) => {
                self.backoff.suspend(retry_after).await;
                self.call(strategy, chat, platform).await
            }
            other => other,
        }
    }

    async fn call<P: ChatPlatform>(
        &self,
        strategy: RetrievalStrategy,
        chat: ChatId,
        platform: &P,
    ) -> Result<Vec<Member>, PlatformError> {
        match strategy {
            RetrievalStrategy::Members => with_timeout(self.call_timeout, platform.list_members(chat)).await,
            RetrievalStrategy::Administrators => {
                with_timeout(self.call_timeout, platform.list_administrators(chat)).await
            }
            RetrievalStrategy::History { limit } => {
                with_timeout(self.call_timeout, platform.recent_senders(chat, limit)).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::platform::fake::FakePlatform;

    const CHAT: ChatId = ChatId(-100_123);
    const TTL: Duration = Duration::from_secs(30 * 60);

    fn directory() -> MemberDirectory {
        MemberDirectory::new(FallbackPolicy::standard(150), TTL)
    }

    fn alice_bob() -> Vec<Member> {
        vec![
            Member::new(1, "Alice").with_handle("alice"),
            Member::new(2, "Bob").with_handle("bob"),
        ]
    }

    #[tokio::test]
    async fn test_get_snapshot_absent_before_refresh() {
        assert!(directory().get_snapshot(CHAT).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_snapshot_is_not_refetched() {
        let dir = directory();
        let platform = FakePlatform::new().with_members(Ok(alice_bob()));

        dir.ensure_fresh(CHAT, &platform, false).await.unwrap();
        assert_eq!(platform.member_calls(), 1);

        tokio::time::advance(TTL - Duration::from_secs(1)).await;
        let snapshot = dir.ensure_fresh(CHAT, &platform, false).await.unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(platform.total_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_snapshot_triggers_one_refresh() {
        let dir = directory();
        let platform = FakePlatform::new().with_members(Ok(alice_bob()));

        dir.ensure_fresh(CHAT, &platform, false).await.unwrap();
        tokio::time::advance(TTL).await;

        dir.ensure_fresh(CHAT, &platform, false).await.unwrap();
        assert_eq!(platform.member_calls(), 2);
        assert_eq!(platform.admin_calls(), 0);

        // The new capture is fresh again.
        dir.ensure_fresh(CHAT, &platform, false).await.unwrap();
        assert_eq!(platform.member_calls(), 2);
    }

    #[tokio::test]
    async fn test_force_refreshes_fresh_snapshot() {
        let dir = directory();
        let platform = FakePlatform::new().with_members(Ok(alice_bob()));

        dir.ensure_fresh(CHAT, &platform, false).await.unwrap();
        platform.set_members(Ok(vec![Member::new(3, "Carol")]));
        let snapshot = dir.ensure_fresh(CHAT, &platform, true).await.unwrap();

        assert_eq!(platform.member_calls(), 2);
        assert_eq!(snapshot.members()[0].display_name, "Carol");
    }

    #[tokio::test]
    async fn test_permission_error_falls_back_to_admins() {
        let dir = directory();
        let platform = FakePlatform::new()
            .with_members(Err(PlatformError::PermissionDenied("CHAT_ADMIN_REQUIRED".to_owned())))
            .with_admins(Ok(vec![Member::new(10, "Admin")]));

        let snapshot = dir.ensure_fresh(CHAT, &platform, false).await.unwrap();

        assert_eq!(snapshot.source(), RetrievalStrategy::Administrators);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(platform.history_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_results_fall_through_to_history() {
        let dir = directory();
        let platform = FakePlatform::new()
            .with_admins(Ok(vec![Member::new(50, "GroupHelpBot").automated()]))
            .with_history(Ok(vec![
                Member::new(2, "Bob"),
                Member::new(1, "Alice"),
                Member::new(2, "Bob"),
                Member::new(60, "SomeBot").automated(),
            ]));

        let snapshot = dir.ensure_fresh(CHAT, &platform, false).await.unwrap();

        assert_eq!(snapshot.source(), RetrievalStrategy::History { limit: 150 });
        let ids: Vec<_> = snapshot.members().iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(platform.history_limits(), vec![150]);
    }

    #[tokio::test]
    async fn test_custom_order_is_respected() {
        let policy = FallbackPolicy::parse("history,members", 20).unwrap();
        let dir = MemberDirectory::new(policy, TTL);
        let platform = FakePlatform::new()
            .with_members(Ok(alice_bob()))
            .with_history(Ok(vec![Member::new(7, "Talker")]));

        let snapshot = dir.ensure_fresh(CHAT, &platform, false).await.unwrap();

        assert_eq!(snapshot.members()[0].display_name, "Talker");
        assert_eq!(platform.member_calls(), 0);
        assert_eq!(platform.admin_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let dir = directory();
        let platform = FakePlatform::new().with_members(Ok(alice_bob()));
        dir.ensure_fresh(CHAT, &platform, false).await.unwrap();

        platform.set_members(Ok(Vec::new()));
        let err = dir.ensure_fresh(CHAT, &platform, true).await.unwrap_err();

        assert_eq!(err, RetrievalError::EmptyResult);
        let kept = dir.get_snapshot(CHAT).await.unwrap();
        assert_eq!(kept.len(), 2);
        assert!(dir.find_by_handle(CHAT, "alice").await.is_some());
    }

    #[tokio::test]
    async fn test_most_informative_error_is_reported() {
        let dir = directory();
        let platform = FakePlatform::new()
            .with_members(Err(PlatformError::PermissionDenied("CHAT_ADMIN_REQUIRED".to_owned())))
            .with_admins(Err(PlatformError::Transport("connection reset".to_owned())));

        let err = dir.ensure_fresh(CHAT, &platform, false).await.unwrap_err();

        assert!(matches!(err, RetrievalError::PermissionDenied(_)));
        assert!(dir.get_snapshot(CHAT).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_and_retries_once() {
        let dir = directory().with_backoff(FloodBackoff::from_secs(60));
        let platform = FakePlatform::new().with_members(Ok(alice_bob()));
        platform.push_members(Err(PlatformError::RateLimited {
            retry_after: Duration::from_secs(15),
        }));

        let start = tokio::time::Instant::now();
        let snapshot = dir.ensure_fresh(CHAT, &platform, false).await.unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(platform.member_calls(), 2);
        assert!(start.elapsed() >= Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_rate_limit_propagates() {
        let dir = directory().with_backoff(FloodBackoff::from_secs(60));
        let platform = FakePlatform::new()
            .with_members(Err(PlatformError::RateLimited {
                retry_after: Duration::from_secs(600),
            }))
            .with_admins(Ok(alice_bob()));

        let start = tokio::time::Instant::now();
        let err = dir.ensure_fresh(CHAT, &platform, false).await.unwrap_err();

        assert_eq!(
            err,
            RetrievalError::RateLimited {
                retry_after: Duration::from_secs(600)
            }
        );
        assert_eq!(platform.member_calls(), 2);
        assert_eq!(platform.admin_calls(), 0);
        // Waited the cap, not the requested ten minutes.
        assert!(start.elapsed() < Duration::from_secs(61));
        assert!(dir.get_snapshot(CHAT).await.is_none());
    }

    #[tokio::test]
    async fn test_end_to_end_bot_exclusion_and_lookup() {
        let dir = directory();
        let platform = FakePlatform::new().with_members(Ok(vec![
            Member::new(1, "A").with_handle("bob"),
            Member::new(2, "B"),
            Member::new(3, "C").automated(),
        ]));

        let snapshot = dir.ensure_fresh(CHAT, &platform, false).await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.members().iter().all(|m| m.id.0 != 3));

        let found = dir.find_by_handle(CHAT, "BOB").await.unwrap();
        assert_eq!(found.id.0, 1);

        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..500 {
            let picked = dir.pick_random(CHAT, &mut rng).await.unwrap();
            assert_ne!(picked.id.0, 3);
        }
    }

    #[tokio::test]
    async fn test_pick_random_without_snapshot() {
        let dir = directory();
        assert!(dir.pick_random(CHAT, &mut StdRng::seed_from_u64(0)).await.is_none());
        assert!(dir.find_by_handle(CHAT, "bob").await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_ensure_fresh_refreshes_once() {
        let dir = Arc::new(directory());
        let platform = Arc::new(FakePlatform::new().with_members(Ok(alice_bob())));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let dir = Arc::clone(&dir);
                let platform = Arc::clone(&platform);
                tokio::spawn(async move { dir.ensure_fresh(CHAT, platform.as_ref(), false).await })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().len(), 2);
        }
        assert_eq!(platform.member_calls(), 1);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let dir = directory();
        let platform = FakePlatform::new().with_members(Ok(alice_bob()));
        dir.ensure_fresh(CHAT, &platform, false).await.unwrap();
        assert_eq!(dir.len().await, 1);

        assert!(dir.invalidate(CHAT).await);
        assert!(dir.is_empty().await);
        assert!(!dir.invalidate(CHAT).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_platform_times_out() {
        struct Stalled;

        impl ChatPlatform for Stalled {
            async fn list_members(&self, _chat: ChatId) -> Result<Vec<Member>, PlatformError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
            async fn list_administrators(&self, _chat: ChatId) -> Result<Vec<Member>, PlatformError> {
                Err(PlatformError::PermissionDenied("no".to_owned()))
            }
            async fn recent_senders(&self, _chat: ChatId, _limit: usize) -> Result<Vec<Member>, PlatformError> {
                Ok(Vec::new())
            }
            async fn message_author(
                &self,
                _chat: ChatId,
                _message: crate::platform::MessageId,
            ) -> Result<Option<Member>, PlatformError> {
                Ok(None)
            }
            async fn bot_identity(&self) -> Result<Member, PlatformError> {
                Ok(Member::new(0, "bot").automated())
            }
            async fn send_message(&self, _chat: ChatId, _text: &str) -> Result<(), PlatformError> {
                Ok(())
            }
        }

        let dir = directory().with_call_timeout(Duration::from_secs(5));
        let err = dir.ensure_fresh(CHAT, &Stalled, false).await.unwrap_err();
        assert!(matches!(err, RetrievalError::PermissionDenied(_)));
    }
}
