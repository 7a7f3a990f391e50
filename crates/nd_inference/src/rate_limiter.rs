use std::num::NonZeroU32;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Minimum spacing between granted requests, shared by every caller.
///
/// The lock is held across the wait, so concurrent acquirers queue up in
/// arrival order and each one measures its delay from the grant right
/// before it.
#[derive(Debug)]
pub struct RateLimiter {
    delay: Duration,
    last_grant: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn per_minute(requests: NonZeroU32) -> Self {
        Self::with_delay(Duration::from_secs(60) / requests.get())
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            last_grant: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait until the next request may go out. Never fails.
    pub async fn acquire(&self) {
        let mut last_grant = self.last_grant.lock().await;
        if let Some(previous) = *last_grant {
            sleep_until(previous + self.delay).await;
        }
        *last_grant = Some(Instant::now());
    }
}
