//! Flood-wait handling for member retrieval.
//!
//! When Telegram answers with `FLOOD_WAIT_N` the caller sleeps for `N`
//! seconds before retrying. The sleep is capped so a single command never
//! hangs for minutes.

use std::time::Duration;

use tracing::{debug, warn};

/// Bounded suspension for platform rate limits.
#[derive(Debug, Clone, Copy)]
pub struct FloodBackoff {
    /// Longest single suspension.
    cap: Duration,
}

impl Default for FloodBackoff {
    fn default() -> Self {
        Self::from_secs(60)
    }
}

impl FloodBackoff {
    #[must_use]
    pub const fn new(cap: Duration) -> Self {
        Self { cap }
    }

    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// The wait actually applied for a requested `retry_after`.
    #[must_use]
    pub fn bounded(&self, retry_after: Duration) -> Duration {
        retry_after.min(self.cap)
    }

    /// Suspends the calling task for the bounded wait.
    ///
    /// Only the current task sleeps; other chats keep being served.
    /// Returns the duration waited.
    pub async fn suspend(&self, retry_after: Duration) -> Duration {
        let wait = self.bounded(retry_after);
        if wait < retry_after {
            warn!(
                "Flood wait of {}s exceeds cap, waiting {}s",
                retry_after.as_secs(),
                wait.as_secs()
            );
        } else {
            debug!("Flood wait: sleeping {:?} before retry", wait);
        }

        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        wait
    }
}
