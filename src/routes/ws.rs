//! WebSocket handler: the feed's presentation surface.
//!
//! DESIGN
//! ======
//! Each connection owns one `FeedController` bound to the signed-in account.
//! The connection loop `select!`s over three sources:
//! - Incoming client frames → parse + dispatch by syscall
//! - Replies from spawned send tasks → forward to client
//! - `FeedView` changes from the controller's watch channel → push a
//!   `feed:snapshot` frame carrying the whole view
//!
//! Sends run on their own task so the loop keeps relaying snapshots (and
//! rejecting overlapping sends) while an append is in flight.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → resolve sender name → send `session:connected`
//! 2. Client sends `feed:subscribe` → controller subscribes → snapshots flow
//! 3. Close → `unsubscribe` → controller dropped

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::feed::controller::FeedError;
use crate::feed::{FeedController, FeedView, SendOutcome, Viewer};
use crate::frame::{Data, Frame, Status};
use crate::services::session::{self, SessionUser};
use crate::state::AppState;

const CLIENT_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(ticket) = params.get("ticket") else {
        return (StatusCode::UNAUTHORIZED, "ticket required").into_response();
    };

    let user = match session::consume_ws_ticket(&state.pool, ticket).await {
        Ok(Some(user)) => user,
        Ok(None) => return (StatusCode::UNAUTHORIZED, "invalid or expired ticket").into_response(),
        Err(e) => {
            tracing::error!(error = %e, "ws ticket validation failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "ticket validation error").into_response();
        }
    };

    ws.on_upgrade(move |socket| run_ws(socket, state, user))
}

// =============================================================================
// CONNECTION
// =============================================================================

/// Per-connection feed session: the controller, who it acts for, and the
/// channel spawned send tasks reply on.
struct FeedSession {
    controller: FeedController,
    viewer: Viewer,
    client_id: Uuid,
    client_tx: mpsc::Sender<Frame>,
}

impl FeedSession {
    async fn open(state: &AppState, user: &SessionUser, client_tx: mpsc::Sender<Frame>) -> Self {
        let controller = FeedController::new(state.store.clone(), state.feed);
        let sender_name = controller.resolve_sender_name(user.id, Some(user.name.as_str())).await;
        let viewer = Viewer { account_id: user.id, sender_id: user.id, sender_name };
        Self { controller, viewer, client_id: Uuid::new_v4(), client_tx }
    }
}

async fn run_ws(mut socket: WebSocket, state: AppState, user: SessionUser) {
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(CLIENT_CHANNEL_CAPACITY);
    let session = FeedSession::open(&state, &user, client_tx).await;
    let client_id = session.client_id;
    let mut view_rx = session.controller.watch();

    let welcome = Frame::request("session:connected", Data::new())
        .with_account_id(session.viewer.account_id)
        .with_data("client_id", client_id.to_string())
        .with_data("user_id", user.id.to_string())
        .with_data("name", session.viewer.sender_name.clone());
    if send_frame(&mut socket, &welcome).await.is_err() {
        return;
    }

    info!(%client_id, user_id = %user.id, "ws: client connected");

    if send_frame(&mut socket, &snapshot_frame(&session.controller.view())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_inbound_text(&session, &text).await;
                        if send_frames(&mut socket, &replies).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(frame) = client_rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
            changed = view_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = view_rx.borrow_and_update().clone();
                if send_frame(&mut socket, &snapshot_frame(&view)).await.is_err() {
                    break;
                }
            }
        }
    }

    session.controller.unsubscribe();
    info!(%client_id, "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the client.
///
/// Send requests return nothing here; their reply arrives on the session's
/// client channel once the append settles.
async fn process_inbound_text(session: &FeedSession, text: &str) -> Vec<Frame> {
    let mut req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(client_id = %session.client_id, error = %e, "ws: invalid inbound frame");
            let err = Frame::request("gateway:error", Data::new()).with_data("message", format!("invalid json: {e}"));
            return vec![err];
        }
    };

    req.from = Some(session.viewer.sender_id.to_string());
    req.account_id = Some(session.viewer.account_id);
    info!(client_id = %session.client_id, id = %req.id, syscall = %req.syscall, "ws: recv frame");

    match req.prefix() {
        "feed" => handle_feed(session, &req).await,
        prefix => vec![req.error(format!("unknown prefix: {prefix}"))],
    }
}

async fn handle_feed(session: &FeedSession, req: &Frame) -> Vec<Frame> {
    let controller = &session.controller;
    match req.op() {
        "subscribe" => {
            controller.subscribe(session.viewer.account_id).await;
            vec![req.done()]
        }
        "unsubscribe" => {
            controller.unsubscribe();
            vec![req.done()]
        }
        "draft" => {
            let Some(text) = req.str_field("text") else {
                return vec![req.error("text required")];
            };
            controller.set_draft(text);
            vec![req.done()]
        }
        "send" => {
            let Some(text) = req.str_field("text").map(str::to_owned) else {
                return vec![req.error("text required")];
            };
            let controller = controller.clone();
            let viewer = session.viewer.clone();
            spawn_reply(session, req.clone(), async move {
                controller
                    .send(Some(viewer.account_id), &text, Some(viewer.sender_id), &viewer.sender_name)
                    .await
            });
            vec![]
        }
        "submit" => {
            let controller = controller.clone();
            let viewer = session.viewer.clone();
            spawn_reply(session, req.clone(), async move { controller.submit(&viewer).await });
            vec![]
        }
        op => vec![req.error(format!("unknown feed op: {op}"))],
    }
}

/// Run one send off the connection loop and post its reply frame.
fn spawn_reply(session: &FeedSession, req: Frame, send: impl Future<Output = SendOutcome> + Send + 'static) {
    let client_tx = session.client_tx.clone();
    tokio::spawn(async move {
        let outcome = send.await;
        if client_tx.send(outcome_frame(&req, outcome)).await.is_err() {
            debug!(syscall = %req.syscall, "ws: client gone before send reply");
        }
    });
}

fn outcome_frame(req: &Frame, outcome: SendOutcome) -> Frame {
    match outcome {
        SendOutcome::Sent(id) => req.done_with(Data::from([("id".to_owned(), serde_json::Value::String(id))])),
        SendOutcome::Rejected(reason) => req.error_from(&FeedError::Validation(reason)),
        SendOutcome::Failed(err) => req.error_from(&err),
    }
}

/// Full view as an unsolicited `feed:snapshot` frame.
fn snapshot_frame(view: &FeedView) -> Frame {
    let data: Data = match serde_json::to_value(view) {
        Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
        Ok(_) | Err(_) => Data::new(),
    };
    let frame = Frame::request("feed:snapshot", data);
    match view.account_id {
        Some(account_id) => frame.with_account_id(account_id),
        None => frame,
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_frames(socket: &mut WebSocket, frames: &[Frame]) -> Result<(), ()> {
    for frame in frames {
        send_frame(socket, frame).await?;
    }
    Ok(())
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    if frame.status == Status::Error {
        let code = frame.str_field(crate::frame::FRAME_CODE).unwrap_or("-");
        let message = frame.str_field(crate::frame::FRAME_MESSAGE).unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
    } else {
        debug!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
    }
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
