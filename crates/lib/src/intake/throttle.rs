//! Politeness delays between requests to the scrape source.

use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// A fixed delay plus a uniformly random jitter in `[0, jitter)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    base: Duration,
    jitter: Duration,
}

impl Throttle {
    pub fn new(base: Duration, jitter: Duration) -> Self {
        Self { base, jitter }
    }

    pub fn from_millis(base_ms: u64, jitter_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(base_ms),
            Duration::from_millis(jitter_ms),
        )
    }

    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.base;
        }
        self.base + Duration::from_millis(rand::rng().random_range(0..jitter_ms))
    }

    pub async fn wait(&self) {
        let delay = self.next_delay();
        if delay.is_zero() {
            return;
        }
        debug!("Waiting for {:.2} seconds before next request...", delay.as_secs_f64());
        tokio::time::sleep(delay).await;
    }
}
