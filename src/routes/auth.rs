//! Auth routes: email access codes, session management, WS tickets.

use axum::Json;
use axum::extract::{FromRef, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use time::Duration;
use tracing::{debug, error, info, warn};

use crate::services::mailer::access_code_email;
use crate::services::{email_auth, session};
use crate::state::AppState;

const COOKIE_NAME: &str = "session_token";
const SESSION_MAX_AGE_DAYS: i64 = 30;

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

pub(crate) fn cookie_secure() -> bool {
    env_bool("COOKIE_SECURE").unwrap_or(false)
}

fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::days(SESSION_MAX_AGE_DAYS))
        .build()
}

fn cleared_session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::ZERO)
        .build()
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated user extracted from the session cookie.
/// Use as a handler parameter to require authentication.
pub struct AuthUser {
    pub user: session::SessionUser,
    pub token: String,
}

impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar.get(COOKIE_NAME).map(Cookie::value).unwrap_or_default();
        if token.is_empty() {
            return Err(StatusCode::UNAUTHORIZED);
        }

        let app_state = AppState::from_ref(state);
        let user = session::validate_session(&app_state.pool, token)
            .await
            .map_err(|e| {
                error!(error = %e, "session validation failed");
                StatusCode::INTERNAL_SERVER_ERROR
            })?
            .ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(Self { user, token: token.to_owned() })
    }
}

// =============================================================================
// EMAIL ACCESS CODES
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RequestCodeBody {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeBody {
    pub email: String,
    pub code: String,
}

/// `POST /api/auth/email/request-code`: issue and deliver a sign-in code.
pub async fn request_email_code(State(state): State<AppState>, Json(body): Json<RequestCodeBody>) -> Response {
    let Some(email) = email_auth::normalize_email(&body.email) else {
        return error_body(StatusCode::BAD_REQUEST, "invalid email");
    };

    if let Err(e) = state.rate_limiter.check_and_record(&email) {
        warn!(%email, error = %e, "access code rate limited");
        return error_body(StatusCode::TOO_MANY_REQUESTS, &e.to_string());
    }

    let code = match email_auth::request_access_code(&state.pool, &email).await {
        Ok(code) => code,
        Err(email_auth::EmailAuthError::InvalidEmail) => {
            return error_body(StatusCode::BAD_REQUEST, "invalid email");
        }
        Err(e) => {
            error!(error = %e, "access code request failed");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, "could not issue code");
        }
    };

    match &state.mailer {
        Some(mailer) => {
            if let Err(e) = mailer.send(access_code_email(&email, &code)).await {
                error!(%email, error = %e, "access code delivery failed");
                return error_body(StatusCode::BAD_GATEWAY, "could not send code");
            }
            info!(%email, "access code sent");
        }
        None => debug!(%email, %code, "mailer not configured; access code not delivered"),
    }

    Json(serde_json::json!({ "ok": true })).into_response()
}

/// `POST /api/auth/email/verify-code`: exchange a code for a session cookie.
pub async fn verify_email_code(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<VerifyCodeBody>,
) -> Response {
    let user_id = match email_auth::verify_access_code(&state.pool, &body.email, &body.code).await {
        Ok(id) => id,
        Err(
            e @ (email_auth::EmailAuthError::InvalidEmail
            | email_auth::EmailAuthError::InvalidCode
            | email_auth::EmailAuthError::VerificationFailed),
        ) => {
            info!(error = %e, "access code rejected");
            return error_body(StatusCode::UNAUTHORIZED, &e.to_string());
        }
        Err(e) => {
            error!(error = %e, "access code verification failed");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, "verification failed");
        }
    };

    let token = match session::create_session(&state.pool, user_id).await {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "session creation failed");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, "could not create session");
        }
    };

    info!(%user_id, "signed in with access code");
    let jar = jar.add(session_cookie(token, cookie_secure()));
    (jar, Json(serde_json::json!({ "ok": true }))).into_response()
}

// =============================================================================
// SESSION
// =============================================================================

/// `GET /api/auth/me`: return current user.
pub async fn me(auth: AuthUser) -> Json<session::SessionUser> {
    Json(auth.user)
}

/// `POST /api/auth/logout`: delete session, clear cookie.
pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> impl IntoResponse {
    if let Err(e) = session::delete_session(&state.pool, &auth.token).await {
        warn!(error = %e, "session delete failed");
    }

    let jar = CookieJar::new().add(cleared_session_cookie(cookie_secure()));
    (jar, StatusCode::NO_CONTENT)
}

/// `POST /api/auth/ws-ticket`: create a one-time WS ticket.
pub async fn ws_ticket(State(state): State<AppState>, auth: AuthUser) -> Result<Json<serde_json::Value>, StatusCode> {
    let ticket = session::create_ws_ticket(&state.pool, auth.user.id)
        .await
        .map_err(|e| {
            error!(error = %e, "ws ticket creation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(serde_json::json!({ "ticket": ticket })))
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
