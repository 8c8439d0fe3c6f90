//! `GET /api/messages`: one-shot feed read for clients that do not hold a
//! websocket open.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::error;

use super::auth::AuthUser;
use crate::feed::{Message, materialize};
use crate::state::AppState;

pub async fn list_messages(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Vec<Message>>, StatusCode> {
    let limit = state.feed.history_limit;
    let snapshot = state.store.snapshot(auth.user.id, limit).await.map_err(|e| {
        error!(account_id = %auth.user.id, error = %e, "message snapshot failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(materialize(snapshot, limit)))
}

#[cfg(test)]
#[path = "messages_test.rs"]
mod tests;
