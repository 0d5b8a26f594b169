//! Environment abstraction for deterministic testing.
//!
//! Decouples the state machines from system time. Production drives them with
//! a real clock; tests and simulations use [`ManualEnv`], whose clock only
//! moves when told to.

use std::{
    fmt::Debug,
    ops::Sub,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};

/// Abstract environment providing monotonic and wall-clock time.
///
/// # Invariants
///
/// - `now()` never goes backwards within one execution context. Timers are
///   computed as `now - armed_at`, which assumes monotonicity.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type.
    ///
    /// Production uses a real instant; simulation uses a virtual one.
    type Instant: Copy + Ord + Send + Sync + Debug + Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time, used to timestamp optimistic messages.
    fn wall_clock(&self) -> DateTime<Utc>;
}

/// Wall-clock origin of [`ManualEnv`] (2024-01-01T00:00:00Z).
const MANUAL_EPOCH_MILLIS: i64 = 1_704_067_200_000;

/// Environment with a hand-advanced clock.
///
/// Instants are the virtual time elapsed since creation. Clones share the same
/// clock.
#[derive(Debug, Clone, Default)]
pub struct ManualEnv {
    elapsed_ms: Arc<AtomicU64>,
}

impl ManualEnv {
    /// Create an environment at virtual time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.elapsed_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Environment for ManualEnv {
    type Instant = Duration;

    fn now(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms.load(Ordering::SeqCst))
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        let elapsed = i64::try_from(self.elapsed_ms.load(Ordering::SeqCst)).unwrap_or(i64::MAX);
        DateTime::from_timestamp_millis(MANUAL_EPOCH_MILLIS.saturating_add(elapsed))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_clock() {
        let env = ManualEnv::new();
        let other = env.clone();
        env.advance(Duration::from_millis(1500));
        assert_eq!(other.now(), Duration::from_millis(1500));
    }

    #[test]
    fn wall_clock_tracks_virtual_time() {
        let env = ManualEnv::new();
        let before = env.wall_clock();
        env.advance(Duration::from_secs(2));
        assert_eq!((env.wall_clock() - before).num_milliseconds(), 2000);
    }
}
