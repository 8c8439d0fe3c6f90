use axum::extract::FromRequestParts;
use axum::http::Request;

use super::*;
use crate::state::test_helpers::test_app_state;

// =============================================================================
// env_bool: uses unique env var names to avoid races with parallel tests.
// =============================================================================

#[test]
fn env_bool_true_variants() {
    for (i, val) in ["1", "true", "yes", "on", "TRUE", " On "].iter().enumerate() {
        let key = format!("__TEST_DD_EB_TRUE_{i}__");
        unsafe { std::env::set_var(&key, val) };
        assert_eq!(env_bool(&key), Some(true), "expected true for {val:?}");
        unsafe { std::env::remove_var(&key) };
    }
}

#[test]
fn env_bool_false_variants() {
    for (i, val) in ["0", "false", "no", "off"].iter().enumerate() {
        let key = format!("__TEST_DD_EB_FALSE_{i}__");
        unsafe { std::env::set_var(&key, val) };
        assert_eq!(env_bool(&key), Some(false), "expected false for {val:?}");
        unsafe { std::env::remove_var(&key) };
    }
}

#[test]
fn env_bool_invalid_or_unset_returns_none() {
    let key = "__TEST_DD_EB_INVALID_311__";
    unsafe { std::env::set_var(key, "maybe") };
    assert_eq!(env_bool(key), None);
    unsafe { std::env::remove_var(key) };
    assert_eq!(env_bool("__TEST_DD_EB_SURELY_UNSET_312__"), None);
}

// =============================================================================
// cookies
// =============================================================================

#[test]
fn session_cookie_is_http_only_and_lax() {
    let cookie = session_cookie("tok".into(), true);
    assert_eq!(cookie.name(), COOKIE_NAME);
    assert_eq!(cookie.value(), "tok");
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.secure(), Some(true));
    assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    assert_eq!(cookie.path(), Some("/"));
    assert_eq!(cookie.max_age(), Some(Duration::days(SESSION_MAX_AGE_DAYS)));
}

#[test]
fn cleared_cookie_expires_immediately() {
    let cookie = cleared_session_cookie(false);
    assert_eq!(cookie.value(), "");
    assert_eq!(cookie.max_age(), Some(Duration::ZERO));
    assert_eq!(cookie.secure(), Some(false));
}

// =============================================================================
// handlers that short-circuit before the database
// =============================================================================

#[tokio::test]
async fn request_code_rejects_invalid_email() {
    let state = test_app_state();
    let resp = request_email_code(State(state), Json(RequestCodeBody { email: "nope".into() })).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn request_code_is_rate_limited_per_email() {
    let state = test_app_state();
    for _ in 0..2 {
        state.rate_limiter.check_and_record("ada@example.com").unwrap();
    }
    let body = RequestCodeBody { email: "  ADA@example.com ".into() };
    let resp = request_email_code(State(state), Json(body)).await;
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn auth_user_requires_cookie() {
    let state = test_app_state();
    let (mut parts, ()) = Request::builder().uri("/api/auth/me").body(()).unwrap().into_parts();
    let result = AuthUser::from_request_parts(&mut parts, &state).await;
    assert!(matches!(result, Err(StatusCode::UNAUTHORIZED)));
}

#[tokio::test]
async fn auth_user_rejects_empty_cookie() {
    let state = test_app_state();
    let (mut parts, ()) = Request::builder()
        .uri("/api/auth/me")
        .header("cookie", "session_token=")
        .body(())
        .unwrap()
        .into_parts();
    let result = AuthUser::from_request_parts(&mut parts, &state).await;
    assert!(matches!(result, Err(StatusCode::UNAUTHORIZED)));
}
