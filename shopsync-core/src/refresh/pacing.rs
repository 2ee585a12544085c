use std::time::Duration;

use tokio::time::{Instant, sleep_until};

/// Interval rate limiter for outbound calls.
///
/// The first call is admitted immediately; each subsequent call waits until a
/// full interval has elapsed since the previous admit. One `Pacer` spans both
/// the refresh and sync phases of a run so the platform sees a uniform call
/// rate regardless of phase boundaries.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    last_admit: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_admit: None,
        }
    }

    /// Wait until the next call may proceed.
    pub async fn admit(&mut self) {
        if let Some(last) = self.last_admit {
            sleep_until(last + self.interval).await;
        }
        self.last_admit = Some(Instant::now());
    }
}
