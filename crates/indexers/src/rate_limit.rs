//! Per-indexer request rate limiting
//!
//! A sliding one-minute window. `Wait` sleeps until a slot frees up;
//! `Drop` surfaces `RateLimited` so the caller can skip the indexer this
//! round.

use outpost_core::{OutpostError, Result};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// What to do when the window is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitPolicy {
    Wait,
    Drop,
}

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    policy: RateLimitPolicy,
    requests: Mutex<Vec<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests_per_minute: u32, policy: RateLimitPolicy) -> Self {
        Self {
            max_requests: max_requests_per_minute.max(1),
            window: Duration::from_secs(60),
            policy,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Acquire a slot, waiting or failing per the policy.
    pub async fn acquire(&self, service: &str) -> Result<()> {
        let mut requests = self.requests.lock().await;
        let now = Instant::now();
        requests.retain(|&t| now.duration_since(t) < self.window);

        if requests.len() >= self.max_requests as usize {
            let oldest = requests[0];
            let wait = self.window.saturating_sub(now.duration_since(oldest));

            match self.policy {
                RateLimitPolicy::Drop => {
                    return Err(OutpostError::RateLimited {
                        service: service.to_string(),
                        retry_after_secs: Some(wait.as_secs().max(1)),
                    });
                }
                RateLimitPolicy::Wait => {
                    debug!(service, ?wait, "rate limit reached, waiting");
                    drop(requests);
                    tokio::time::sleep(wait).await;

                    requests = self.requests.lock().await;
                    let now = Instant::now();
                    requests.retain(|&t| now.duration_since(t) < self.window);
                }
            }
        }

        requests.push(Instant::now());
        Ok(())
    }
}
