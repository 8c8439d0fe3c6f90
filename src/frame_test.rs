use super::*;

#[test]
fn request_sets_fields() {
    let frame = Frame::request("feed:subscribe", Data::new());
    assert_eq!(frame.syscall, "feed:subscribe");
    assert_eq!(frame.status, Status::Request);
    assert!(frame.parent_id.is_none());
    assert!(frame.account_id.is_none());
    assert!(frame.ts > 0);
}

#[test]
fn done_correlates_to_request() {
    let account = Uuid::new_v4();
    let req = Frame::request("feed:send", Data::new()).with_account_id(account);
    let done = req.done_with(Data::from([("id".to_owned(), serde_json::json!("m1"))]));

    assert_eq!(done.parent_id, Some(req.id));
    assert_eq!(done.account_id, Some(account));
    assert_eq!(done.syscall, "feed:send");
    assert_eq!(done.status, Status::Done);
    assert_eq!(done.str_field("id"), Some("m1"));
}

#[test]
fn prefix_and_op() {
    let frame = Frame::request("feed:send", Data::new());
    assert_eq!(frame.prefix(), "feed");
    assert_eq!(frame.op(), "send");

    let frame = Frame::request("noseparator", Data::new());
    assert_eq!(frame.prefix(), "noseparator");
    assert_eq!(frame.op(), "");
}

#[test]
fn inbound_frame_fills_defaults() {
    let id = Uuid::new_v4();
    let raw = format!(r#"{{"id":"{id}","syscall":"feed:send","status":"request","data":{{"text":"hi"}}}}"#);
    let frame: Frame = serde_json::from_str(&raw).expect("parse");

    assert_eq!(frame.id, id);
    assert!(frame.parent_id.is_none());
    assert_eq!(frame.ts, 0);
    assert_eq!(frame.str_field("text"), Some("hi"));
}

#[test]
fn account_id_omitted_when_absent() {
    let frame = Frame::request("session:connected", Data::new());
    let json = serde_json::to_value(&frame).expect("serialize");
    assert!(json.get("account_id").is_none());
}

#[test]
fn error_from_typed() {
    #[derive(Debug, thiserror::Error)]
    #[error("permission-denied")]
    struct Denied;

    impl ErrorCode for Denied {
        fn error_code(&self) -> &'static str {
            "E_WRITE"
        }

        fn retryable(&self) -> bool {
            true
        }
    }

    let req = Frame::request("feed:send", Data::new());
    let err = req.error_from(&Denied);

    assert_eq!(err.status, Status::Error);
    assert_eq!(err.str_field(FRAME_CODE), Some("E_WRITE"));
    assert_eq!(err.str_field(FRAME_MESSAGE), Some("permission-denied"));
    assert_eq!(err.data.get(FRAME_RETRYABLE).and_then(serde_json::Value::as_bool), Some(true));
}
