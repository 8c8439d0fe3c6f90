use std::sync::Arc;

use uuid::Uuid;

use super::*;
use crate::services::session::SessionUser;
use crate::state::test_helpers::{RecordingMailer, test_app_state};

fn auth() -> AuthUser {
    AuthUser {
        user: SessionUser { id: Uuid::new_v4(), email: None, name: "ada".into(), email_verified: true },
        token: "tok".into(),
    }
}

#[test]
fn validation_errors_map_to_unprocessable() {
    assert_eq!(contact_error_status(&ContactError::MissingField("name")), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(contact_error_status(&ContactError::InvalidEmail), StatusCode::UNPROCESSABLE_ENTITY);
}

#[test]
fn database_errors_map_to_server_error() {
    let err = ContactError::Db(sqlx::Error::RowNotFound);
    assert_eq!(contact_error_status(&err), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn incomplete_form_is_rejected_without_notifying() {
    let mailer = Arc::new(RecordingMailer::default());
    let state = test_app_state().with_mailer(mailer.clone(), Some("studio@example.com".into()));
    let form = ContactForm { name: "Ada".into(), email: "ada@example.com".into(), ..ContactForm::default() };

    let resp = submit_contact(State(state), auth(), Json(form)).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(mailer.sent.lock().unwrap().is_empty());
}
