//! Service configuration parsed from environment variables.
//!
//! `.env` is loaded by `main` (via `dotenvy`) before `AppConfig::from_env`
//! runs, so every knob can live in either place.

use std::time::Duration;

use crate::feed::DEFAULT_HISTORY_LIMIT;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_FEED_SEND_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_ACCESS_CODE_REQUESTS: usize = 5;
pub const DEFAULT_ACCESS_CODE_WINDOW_SECS: u64 = 900;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Which message store backs the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

/// Feed controller tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedConfig {
    /// Records materialized per session, oldest first.
    pub history_limit: usize,
    /// Upper bound on one append. `None` waits forever.
    pub send_timeout: Option<Duration>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            send_timeout: Some(Duration::from_millis(DEFAULT_FEED_SEND_TIMEOUT_MS)),
        }
    }
}

/// Resend credentials. Absent means email delivery is disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailConfig {
    pub api_key: String,
    pub from: String,
    /// Studio inbox notified of new contact requests.
    pub contact_notify: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessCodeLimits {
    pub requests_per_window: usize,
    pub window: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub store: StoreKind,
    pub feed: FeedConfig,
    pub mail: Option<MailConfig>,
    pub access_codes: AccessCodeLimits,
}

impl AppConfig {
    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `DATABASE_URL`
    ///
    /// Optional:
    /// - `PORT`: default 3000
    /// - `FEED_STORE`: `postgres` (default) or `memory`
    /// - `FEED_HISTORY_LIMIT`: default 100, must be positive
    /// - `FEED_SEND_TIMEOUT_MS`: default 10000, `0` disables the timeout
    /// - `RESEND_API_KEY` + `RESEND_FROM`: enable email delivery
    /// - `CONTACT_NOTIFY_EMAIL`: studio inbox for contact requests
    /// - `ACCESS_CODE_REQUESTS_PER_WINDOW`: default 5
    /// - `ACCESS_CODE_WINDOW_SECS`: default 900
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does not
    /// parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
        let port = env_parse_strict("PORT", DEFAULT_PORT)?;
        let store = parse_store_kind(std::env::var("FEED_STORE").ok().as_deref())?;

        let send_timeout_ms = env_parse_strict("FEED_SEND_TIMEOUT_MS", DEFAULT_FEED_SEND_TIMEOUT_MS)?;
        let history_limit = env_parse_strict("FEED_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?;
        if history_limit == 0 {
            return Err(ConfigError::Invalid { key: "FEED_HISTORY_LIMIT", value: "0".to_owned() });
        }
        let feed = FeedConfig {
            history_limit,
            send_timeout: (send_timeout_ms > 0).then(|| Duration::from_millis(send_timeout_ms)),
        };

        let mail = mail_config(
            std::env::var("RESEND_API_KEY").ok(),
            std::env::var("RESEND_FROM").ok(),
            std::env::var("CONTACT_NOTIFY_EMAIL").ok(),
        );

        let access_codes = AccessCodeLimits {
            requests_per_window: env_parse_strict("ACCESS_CODE_REQUESTS_PER_WINDOW", DEFAULT_ACCESS_CODE_REQUESTS)?,
            window: Duration::from_secs(env_parse_strict("ACCESS_CODE_WINDOW_SECS", DEFAULT_ACCESS_CODE_WINDOW_SECS)?),
        };

        Ok(Self { port, database_url, store, feed, mail, access_codes })
    }
}

fn env_parse_strict<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        Err(_) => Ok(default),
    }
}

fn parse_store_kind(raw: Option<&str>) -> Result<StoreKind, ConfigError> {
    match raw.map(str::trim).unwrap_or("postgres") {
        "postgres" | "pg" => Ok(StoreKind::Postgres),
        "memory" => Ok(StoreKind::Memory),
        other => Err(ConfigError::Invalid { key: "FEED_STORE", value: other.to_owned() }),
    }
}

fn mail_config(api_key: Option<String>, from: Option<String>, contact_notify: Option<String>) -> Option<MailConfig> {
    let api_key = api_key.filter(|v| !v.trim().is_empty())?;
    let from = from.filter(|v| !v.trim().is_empty())?;
    let contact_notify = contact_notify.filter(|v| !v.trim().is_empty());
    Some(MailConfig { api_key, from, contact_notify })
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
