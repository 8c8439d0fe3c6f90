//! Contact request routes.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{error, info, warn};

use super::auth::AuthUser;
use crate::services::contact::{self, ContactError, ContactForm, ContactRequest};
use crate::services::mailer::contact_notice_email;
use crate::state::AppState;

pub(crate) fn contact_error_status(err: &ContactError) -> StatusCode {
    match err {
        ContactError::MissingField(_) | ContactError::InvalidEmail => StatusCode::UNPROCESSABLE_ENTITY,
        ContactError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `GET /api/contact`: the caller's requests, newest first.
pub async fn list_contacts(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Vec<ContactRequest>>, StatusCode> {
    contact::list_contacts(&state.pool, auth.user.id)
        .await
        .map(Json)
        .map_err(|e| {
            error!(user_id = %auth.user.id, error = %e, "contact list failed");
            contact_error_status(&e)
        })
}

/// `POST /api/contact`: validate, store and notify the studio inbox.
pub async fn submit_contact(State(state): State<AppState>, auth: AuthUser, Json(form): Json<ContactForm>) -> Response {
    let valid = match form.validate() {
        Ok(valid) => valid,
        Err(e) => {
            return (contact_error_status(&e), Json(serde_json::json!({ "error": e.to_string() }))).into_response();
        }
    };

    let request = match contact::submit_contact(&state.pool, auth.user.id, &valid).await {
        Ok(request) => request,
        Err(e) => {
            error!(user_id = %auth.user.id, error = %e, "contact submit failed");
            return contact_error_status(&e).into_response();
        }
    };
    info!(contact_id = %request.id, user_id = %auth.user.id, "contact request stored");

    if let (Some(mailer), Some(inbox)) = (&state.mailer, &state.contact_notify) {
        let notice = contact_notice_email(inbox, &valid.name, &valid.email, &valid.subject, &valid.message);
        // The request is already stored; a failed notice only gets logged.
        if let Err(e) = mailer.send(notice).await {
            warn!(contact_id = %request.id, error = %e, "contact notice delivery failed");
        }
    }

    (StatusCode::CREATED, Json(request)).into_response()
}

#[cfg(test)]
#[path = "contact_test.rs"]
mod tests;
