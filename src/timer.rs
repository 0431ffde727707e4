//! The election timer.
//!
//! Wraps a single pinned `tokio::time::Sleep` that gets `reset` in place
//! rather than replaced, so a reset never leaves a stale wakeup queued: the
//! timer must stop, drop any pending deadline, and only then start counting
//! down from the new one.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{self, Instant as TokioInstant, Sleep};

/// A re-armable countdown used for both the election timeout and the
/// heartbeat/replication retry interval.
pub struct ElectionTimer {
    sleep: Pin<Box<Sleep>>,
}

impl ElectionTimer {
    pub fn new(duration: Duration) -> Self {
        ElectionTimer {
            sleep: Box::pin(time::sleep(duration)),
        }
    }

    /// Rearms the timer to fire `duration` from now. Resetting a `Sleep` in
    /// place (rather than constructing a new one) guarantees the previous
    /// deadline cannot be observed as "already elapsed" by a task that polls
    /// immediately afterwards.
    pub fn reset(&mut self, duration: Duration) {
        self.sleep.as_mut().reset(TokioInstant::now() + duration);
    }

    /// Waits for the timer to fire. Cancel-safe: safe to use inside a
    /// `tokio::select!` branch without losing the timer's progress, since
    /// polling a `Sleep` does not consume it.
    pub async fn wait(&mut self) {
        (&mut self.sleep).await
    }
}
