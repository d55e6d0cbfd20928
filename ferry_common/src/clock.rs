//! Time seam for retry loops.
//!
//! Download tasks read wall-clock time through a [`Clock`] (session expiry) and
//! wait through a [`Sleeper`] (backoff). [`SystemClock`] is the production
//! implementation. [`SimulatedClock`] advances virtual time on every sleep and
//! records the requested delays, so tests can observe a whole retry schedule
//! without waiting for it.
//!
//! # Example
//!
//! ```rust
//! use ferry_common::clock::{Clock, Sleeper, SimulatedClock};
//! use std::time::{Duration, SystemTime};
//!
//! # tokio_test_block_on(async {
//! let clock = SimulatedClock::new(SystemTime::UNIX_EPOCH);
//! clock.sleep(Duration::from_secs(3)).await;
//! assert_eq!(clock.now(), SystemTime::UNIX_EPOCH + Duration::from_secs(3));
//! assert_eq!(clock.recorded_sleeps(), vec![Duration::from_secs(3)]);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Something that can wait for a duration.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real time backed by `SystemTime::now` and `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

#[async_trait]
impl Sleeper for SystemClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug)]
struct SimulatedState {
    now: SystemTime,
    sleeps: Vec<Duration>,
}

/// Virtual time: sleeping returns immediately and moves the clock forward.
#[derive(Debug)]
pub struct SimulatedClock {
    state: Mutex<SimulatedState>,
}

impl SimulatedClock {
    pub fn new(start: SystemTime) -> Self {
        Self {
            state: Mutex::new(SimulatedState {
                now: start,
                sleeps: Vec::new(),
            }),
        }
    }

    /// Move the clock forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        self.lock().now += by;
    }

    /// Every duration passed to [`Sleeper::sleep`], in call order.
    pub fn recorded_sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.lock().sleeps.iter().sum()
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new(SystemTime::now())
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> SystemTime {
        self.lock().now
    }
}

#[async_trait]
impl Sleeper for SimulatedClock {
    async fn sleep(&self, duration: Duration) {
        let mut state = self.lock();
        state.now += duration;
        state.sleeps.push(duration);
    }
}
