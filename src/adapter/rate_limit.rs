//! Politeness delay enforced between calls made through a shared HTTP
//! client (spec §4.B / §9: "its internal rate limiter is global").
//! Tracks a single last-seen `Instant` under a mutex rather than a
//! per-key map — there is only one upstream endpoint to be polite to.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct PolitenessDelay {
    min_interval: Duration,
    last_call: Arc<Mutex<Option<Instant>>>,
}

impl PolitenessDelay {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Arc::new(Mutex::new(None)),
        }
    }

    /// Blocks the caller until at least `min_interval` has elapsed since
    /// the previous call anywhere on this instance, then records now as
    /// the new last-call time.
    pub async fn wait(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(last) = *last_call {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_call_waits_out_the_remaining_interval() {
        let delay = PolitenessDelay::new(Duration::from_millis(50));
        let start = Instant::now();
        delay.wait().await;
        delay.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
