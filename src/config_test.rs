use std::sync::{Mutex, MutexGuard, PoisonError};

use super::*;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Serializes tests that touch process env.
fn env_guard() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// # Safety
/// Callers must hold `env_guard()`.
unsafe fn clear_app_env() {
    unsafe {
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("PORT");
        std::env::remove_var("FEED_STORE");
        std::env::remove_var("FEED_HISTORY_LIMIT");
        std::env::remove_var("FEED_SEND_TIMEOUT_MS");
        std::env::remove_var("RESEND_API_KEY");
        std::env::remove_var("RESEND_FROM");
        std::env::remove_var("CONTACT_NOTIFY_EMAIL");
        std::env::remove_var("ACCESS_CODE_REQUESTS_PER_WINDOW");
        std::env::remove_var("ACCESS_CODE_WINDOW_SECS");
    }
}

#[test]
fn from_env_requires_database_url() {
    let _env = env_guard();
    unsafe { clear_app_env() };
    assert!(matches!(AppConfig::from_env(), Err(ConfigError::Missing("DATABASE_URL"))));
}

#[test]
fn from_env_defaults() {
    let _env = env_guard();
    unsafe {
        clear_app_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/devdesk");
    }

    let cfg = AppConfig::from_env().unwrap();
    assert_eq!(cfg.port, DEFAULT_PORT);
    assert_eq!(cfg.store, StoreKind::Postgres);
    assert_eq!(cfg.feed, FeedConfig::default());
    assert_eq!(cfg.feed.history_limit, 100);
    assert!(cfg.mail.is_none());
    assert_eq!(cfg.access_codes.requests_per_window, DEFAULT_ACCESS_CODE_REQUESTS);

    unsafe { clear_app_env() };
}

#[test]
fn from_env_parses_overrides() {
    let _env = env_guard();
    unsafe {
        clear_app_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/devdesk");
        std::env::set_var("PORT", "8080");
        std::env::set_var("FEED_STORE", "memory");
        std::env::set_var("FEED_HISTORY_LIMIT", "25");
        std::env::set_var("FEED_SEND_TIMEOUT_MS", "0");
        std::env::set_var("RESEND_API_KEY", "re_test");
        std::env::set_var("RESEND_FROM", "studio@example.com");
    }

    let cfg = AppConfig::from_env().unwrap();
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.store, StoreKind::Memory);
    assert_eq!(cfg.feed.history_limit, 25);
    assert_eq!(cfg.feed.send_timeout, None);
    let mail = cfg.mail.expect("mail configured");
    assert_eq!(mail.from, "studio@example.com");
    assert_eq!(mail.contact_notify, None);

    unsafe { clear_app_env() };
}

#[test]
fn from_env_rejects_bad_port() {
    let _env = env_guard();
    unsafe {
        clear_app_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/devdesk");
        std::env::set_var("PORT", "not-a-port");
    }

    assert!(matches!(AppConfig::from_env(), Err(ConfigError::Invalid { key: "PORT", .. })));

    unsafe { clear_app_env() };
}

#[test]
fn from_env_rejects_zero_history_limit() {
    let _env = env_guard();
    unsafe {
        clear_app_env();
        std::env::set_var("DATABASE_URL", "postgres://localhost/devdesk");
        std::env::set_var("FEED_HISTORY_LIMIT", "0");
    }

    assert!(matches!(
        AppConfig::from_env(),
        Err(ConfigError::Invalid { key: "FEED_HISTORY_LIMIT", .. })
    ));

    unsafe { clear_app_env() };
}

#[test]
fn parse_store_kind_values() {
    assert_eq!(parse_store_kind(None).unwrap(), StoreKind::Postgres);
    assert_eq!(parse_store_kind(Some("pg")).unwrap(), StoreKind::Postgres);
    assert_eq!(parse_store_kind(Some(" memory ")).unwrap(), StoreKind::Memory);
    assert!(parse_store_kind(Some("redis")).is_err());
}

#[test]
fn mail_config_needs_key_and_sender() {
    assert!(mail_config(None, Some("a@b.c".into()), None).is_none());
    assert!(mail_config(Some("key".into()), None, None).is_none());
    assert!(mail_config(Some("  ".into()), Some("a@b.c".into()), None).is_none());

    let cfg = mail_config(Some("key".into()), Some("a@b.c".into()), Some(String::new())).unwrap();
    assert_eq!(cfg.contact_notify, None);
}
