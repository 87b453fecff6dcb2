//! Hosts the rule scheduler on tokio.
//!
//! A single worker task owns the [`Scheduler`](jump_core::Scheduler) and is
//! fed through a bounded channel, so rule state is never shared. A second
//! task owns the next delay deadline and wakes the worker when it passes.

pub mod replay;
mod timer;
mod worker;

use std::time::Duration;

use jump_core::ClockSource;
use tokio::time::Instant;

pub use worker::{Engine, EngineMessage, EngineOutput};

/// Milliseconds since the engine started, on tokio's clock.
///
/// Follows paused time in tests.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// The instant at which the clock reads `ms`.
    pub fn instant_at(&self, ms: u64) -> Instant {
        self.origin + Duration::from_millis(ms)
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for TokioClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn clock_follows_paused_time() {
        let clock = TokioClock::new();
        assert_eq!(clock.now_ms(), 0);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(clock.now_ms(), 250);
        assert_eq!(clock.instant_at(250), Instant::now());
    }
}
