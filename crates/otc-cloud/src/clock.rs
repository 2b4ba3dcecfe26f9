//! Time source used by pollers and retry loops

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Monotonic clock with an async sleep
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock: `sleep` returns immediately and advances `now`.
///
/// Every requested sleep is recorded so tests can assert on the poll cadence.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    inner: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    offset: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            inner: Mutex::new(ManualState::default()),
        }
    }

    /// Moves virtual time forward without recording a sleep
    pub fn advance(&self, duration: Duration) {
        let mut state = self.lock();
        state.offset += duration;
    }

    /// Total virtual time elapsed since creation
    pub fn elapsed(&self) -> Duration {
        self.lock().offset
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        // A poisoned lock only means another test thread panicked mid-update
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.lock().offset
    }

    async fn sleep(&self, duration: Duration) {
        let mut state = self.lock();
        state.offset += duration;
        state.sleeps.push(duration);
    }
}
