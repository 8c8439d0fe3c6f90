use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use super::*;
use crate::state::test_helpers::test_app_state;

async fn status_of(method: &str, uri: &str) -> StatusCode {
    let app = app(test_app_state());
    let req = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
    app.oneshot(req).await.unwrap().status()
}

#[tokio::test]
async fn healthz_is_ok() {
    assert_eq!(status_of("GET", "/healthz").await, StatusCode::OK);
}

#[tokio::test]
async fn authenticated_routes_reject_missing_cookie() {
    for (method, uri) in [
        ("GET", "/api/auth/me"),
        ("POST", "/api/auth/logout"),
        ("POST", "/api/auth/ws-ticket"),
        ("GET", "/api/messages"),
        ("GET", "/api/contact"),
    ] {
        assert_eq!(status_of(method, uri).await, StatusCode::UNAUTHORIZED, "{method} {uri}");
    }
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    assert_eq!(status_of("GET", "/api/nope").await, StatusCode::NOT_FOUND);
}
