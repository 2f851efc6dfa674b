//! Injectable time source.
//!
//! The rotating signer and slot store reason about durations (`KeyTTL`,
//! `GracePeriod`, `RotationThreshold`) against wall-clock time. Everything
//! that needs "now" takes a `Arc<dyn Clock>` instead of calling
//! `chrono::Utc::now()` directly, so rotation-over-time tests can advance a
//! fixture clock deterministically instead of sleeping in real time.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// A source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock whose value is advanced explicitly by tests.
///
/// Stores time as milliseconds since the Unix epoch in an `AtomicI64` so
/// `advance`/`set` can be called through a shared `Arc<FixtureClock>`
/// without interior mutability ceremony at call sites.
#[derive(Debug)]
pub struct FixtureClock {
    millis: AtomicI64,
}

impl FixtureClock {
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        })
    }

    /// Moves the clock forward by `delta`. Negative durations are rejected
    /// by the caller's test logic, not by this type.
    pub fn advance(&self, delta: chrono::Duration) {
        self.millis.fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for FixtureClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .unwrap_or_else(Utc::now)
    }
}
