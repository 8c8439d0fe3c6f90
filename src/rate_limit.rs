//! In-memory rate limiting for access-code requests.
//!
//! DESIGN
//! ======
//! Sliding-window counters backed by `HashMap<String, VecDeque<Instant>>`,
//! keyed by normalized email. A request is admitted while fewer than
//! `limit` requests from the same key fall inside the window.
//!
//! TRADE-OFFS
//! ==========
//! State is per-process. Multiple replicas each enforce their own window,
//! which is acceptable for a throttle whose job is to stop mailbox flooding.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::AccessCodeLimits;

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded (max {limit} requests/{window_secs}s)")]
    Exceeded { limit: usize, window_secs: u64 },
}

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    limits: AccessCodeLimits,
}

impl RateLimiter {
    #[must_use]
    pub fn new(limits: AccessCodeLimits) -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())), limits }
    }

    /// Check the window for `key`, then record the request.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::Exceeded`] when the window is full.
    pub fn check_and_record(&self, key: &str) -> Result<(), RateLimitError> {
        self.check_and_record_at(key, Instant::now())
    }

    fn check_and_record_at(&self, key: &str, now: Instant) -> Result<(), RateLimitError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let limits = self.limits;

        let deque = inner.entry(key.to_owned()).or_default();
        prune_window(deque, now, limits.window);
        if deque.len() >= limits.requests_per_window {
            return Err(RateLimitError::Exceeded {
                limit: limits.requests_per_window,
                window_secs: limits.window.as_secs(),
            });
        }
        deque.push_back(now);

        // Expire every key, not just this one, so idle emails leave the map.
        let window = limits.window;
        inner.retain(|_, d| {
            prune_window(d, now, window);
            !d.is_empty()
        });
        Ok(())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn prune_window(deque: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = deque.front() {
        if now.duration_since(front) > window {
            deque.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod tests;
