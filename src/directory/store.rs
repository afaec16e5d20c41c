//! In-memory snapshot store keyed by chat.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::{ChatId, Snapshot};

/// Shared table of the latest snapshot per chat.
///
/// Snapshots are swapped as whole `Arc`s under the write lock, so readers
/// see either the old or the new list, never a mix.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: RwLock<HashMap<ChatId, Arc<Snapshot>>>,
}

impl SnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, chat: ChatId) -> Option<Arc<Snapshot>> {
        self.snapshots.read().await.get(&chat).cloned()
    }

    /// Stores `snapshot` unless a newer capture is already present.
    ///
    /// Returns whichever snapshot is current afterwards.
    pub async fn replace(&self, chat: ChatId, snapshot: Snapshot) -> Arc<Snapshot> {
        let mut snapshots = self.snapshots.write().await;

        if let Some(current) = snapshots.get(&chat)
            && current.captured_at() > snapshot.captured_at()
        {
            debug!(chat_id = %chat, "Discarding older snapshot capture");
            return Arc::clone(current);
        }

        let snapshot = Arc::new(snapshot);
        snapshots.insert(chat, Arc::clone(&snapshot));
        snapshot
    }

    pub async fn remove(&self, chat: ChatId) -> Option<Arc<Snapshot>> {
        self.snapshots.write().await.remove(&chat)
    }

    /// Number of chats with a snapshot.
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::directory::{Member, RetrievalStrategy};

    fn snapshot(names: &[&str]) -> Snapshot {
        Snapshot::capture(
            names
                .iter()
                .zip(1..)
                .map(|(name, id)| Member::new(id, *name))
                .collect(),
            RetrievalStrategy::Members,
        )
    }

    #[tokio::test]
    async fn test_replace_and_get() {
        let store = SnapshotStore::new();
        assert!(store.get(ChatId(1)).await.is_none());

        store.replace(ChatId(1), snapshot(&["a", "b"])).await;
        assert_eq!(store.get(ChatId(1)).await.unwrap().len(), 2);
        assert!(store.get(ChatId(2)).await.is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_older_capture_does_not_overwrite() {
        let store = SnapshotStore::new();
        let older = snapshot(&["old"]);
        tokio::time::advance(Duration::from_secs(5)).await;
        let newer = snapshot(&["new", "newer"]);

        store.replace(ChatId(7), newer).await;
        let current = store.replace(ChatId(7), older).await;

        assert_eq!(current.len(), 2);
        assert_eq!(store.get(ChatId(7)).await.unwrap().members()[0].display_name, "new");
    }

    #[tokio::test]
    async fn test_remove() {
        let store = SnapshotStore::new();
        store.replace(ChatId(1), snapshot(&["a"])).await;
        assert!(store.remove(ChatId(1)).await.is_some());
        assert!(store.is_empty().await);
    }
}
