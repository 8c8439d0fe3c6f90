//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the database pool, the message store every feed controller reads
//! from, the optional mailer and the access-code rate limiter. Feed
//! controllers themselves are per-connection and never live here.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::{AccessCodeLimits, FeedConfig};
use crate::feed::MessageStore;
use crate::rate_limit::RateLimiter;
use crate::services::mailer::Mailer;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// Backing store for every feed session.
    pub store: Arc<dyn MessageStore>,
    /// `None` when Resend is not configured; codes are then only logged.
    pub mailer: Option<Arc<dyn Mailer>>,
    pub feed: FeedConfig,
    /// Studio inbox notified about new contact requests.
    pub contact_notify: Option<String>,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    #[must_use]
    pub fn new(pool: PgPool, store: Arc<dyn MessageStore>, feed: FeedConfig, access_codes: AccessCodeLimits) -> Self {
        Self { pool, store, mailer: None, feed, contact_notify: None, rate_limiter: RateLimiter::new(access_codes) }
    }

    #[must_use]
    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>, contact_notify: Option<String>) -> Self {
        self.mailer = Some(mailer);
        self.contact_notify = contact_notify;
        self
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
