//! Production environment.
//!
//! Monotonic time comes from tokio's clock, so runtime tests can pause and
//! advance it. Wall-clock time comes from the system.

use chrono::{DateTime, Utc};
use parley_core::Environment;

/// Environment backed by tokio time and the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn monotonic_time_follows_tokio_clock() {
        let env = SystemEnv::new();
        let start = env.now();
        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(env.now() - start, Duration::from_millis(250));
    }
}
