//! Cooperative backpressure between concurrent downloads.
//!
//! Every download task belonging to one sandbox session holds the same
//! [`RateLimitSignal`]. When any of them sees a rate-limit response it raises
//! the shared backoff floor; every task then waits at least that long before
//! its next retry. The floor only ever rises, so concurrent raises commute.
//!
//! The signal is passed explicitly into each task. [`RateLimitRegistry`] hands
//! out one signal per session id for the lifetime of a batch.
//!
//! # Example
//!
//! ```rust
//! use ferry_common::backpressure::RateLimitRegistry;
//! use std::time::Duration;
//!
//! let registry = RateLimitRegistry::new();
//! let a = registry.signal_for("session-1");
//! let b = registry.signal_for("session-1");
//!
//! a.raise(Duration::from_secs(2), Duration::from_secs(30));
//! assert_eq!(b.floor(), Duration::from_secs(2));
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Shared backoff floor for tasks that talk to the same session.
#[derive(Debug, Default)]
pub struct RateLimitSignal {
    floor_ms: AtomicU64,
    hits: AtomicU32,
}

impl RateLimitSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum delay every sharing task must observe before its next retry.
    pub fn floor(&self) -> Duration {
        Duration::from_millis(self.floor_ms.load(Ordering::SeqCst))
    }

    /// Number of rate-limit responses reported through this signal.
    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::SeqCst)
    }

    /// Record a rate-limit hit and raise the floor.
    ///
    /// The new floor is `max(current * 2, candidate)`, capped at `ceiling`.
    /// Returns the floor after the update.
    pub fn raise(&self, candidate: Duration, ceiling: Duration) -> Duration {
        self.hits.fetch_add(1, Ordering::SeqCst);

        let candidate_ms = duration_millis(candidate);
        let ceiling_ms = duration_millis(ceiling);

        // fetch_update retries on contention; the closure is pure.
        let _ = self
            .floor_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                let next = current
                    .saturating_mul(2)
                    .max(candidate_ms)
                    .min(ceiling_ms);
                (next > current).then_some(next)
            });

        self.floor()
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Hands out one [`RateLimitSignal`] per session id.
#[derive(Debug, Default)]
pub struct RateLimitRegistry {
    signals: Mutex<HashMap<String, Arc<RateLimitSignal>>>,
}

impl RateLimitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal_for(&self, session_id: &str) -> Arc<RateLimitSignal> {
        let mut signals = self.signals.lock().unwrap_or_else(PoisonError::into_inner);
        signals
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(RateLimitSignal::new()))
            .clone()
    }

    /// Number of distinct sessions that have a signal.
    pub fn len(&self) -> usize {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
