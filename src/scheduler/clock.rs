//! Time source for the scheduler.
//!
//! The scheduler never calls `Utc::now()` or `tokio::time::sleep` directly,
//! so tests can drive it with a [`ManualClock`] and never wait.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

/// Longest single sleep. Wall-clock jumps are noticed at this granularity.
const MAX_SLEEP_CHUNK: Duration = Duration::from_secs(3600);

#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Returns once `now() >= deadline`.
    async fn sleep_until(&self, deadline: DateTime<Utc>);
}

/// Real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        loop {
            let remaining = match (deadline - Utc::now()).to_std() {
                Ok(remaining) if !remaining.is_zero() => remaining,
                // Negative or zero: the deadline has passed.
                _ => return,
            };
            tokio::time::sleep(remaining.min(MAX_SLEEP_CHUNK)).await;
        }
    }
}

/// Clock that only moves when told to. Sleeping jumps straight to the
/// deadline and records it.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut current) = self.now.lock() {
            *current = now;
        }
    }

    pub fn advance(&self, delta: TimeDelta) {
        if let Ok(mut current) = self.now.lock() {
            *current += delta;
        }
    }

    /// Deadlines of every sleep that actually had to wait.
    pub fn sleeps(&self) -> Vec<DateTime<Utc>> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }

    async fn sleep_until(&self, deadline: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            if *now < deadline {
                *now = deadline;
                if let Ok(mut sleeps) = self.sleeps.lock() {
                    sleeps.push(deadline);
                }
            }
        }
        tokio::task::yield_now().await;
    }
}
