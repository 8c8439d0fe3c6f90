use super::*;

fn limiter(requests: usize, window_secs: u64) -> RateLimiter {
    RateLimiter::new(AccessCodeLimits { requests_per_window: requests, window: Duration::from_secs(window_secs) })
}

#[test]
fn allows_up_to_limit() {
    let rl = limiter(3, 60);
    let now = Instant::now();

    for i in 0..3 {
        assert!(rl.check_and_record_at("a@example.com", now).is_ok(), "request {i} should succeed");
    }
    assert!(matches!(
        rl.check_and_record_at("a@example.com", now),
        Err(RateLimitError::Exceeded { limit: 3, window_secs: 60 })
    ));
}

#[test]
fn keys_are_independent() {
    let rl = limiter(1, 60);
    let now = Instant::now();

    rl.check_and_record_at("a@example.com", now).unwrap();
    assert!(rl.check_and_record_at("a@example.com", now).is_err());
    assert!(rl.check_and_record_at("b@example.com", now).is_ok());
}

#[test]
fn window_expiry_allows_new_requests() {
    let rl = limiter(2, 60);
    let start = Instant::now();

    rl.check_and_record_at("a@example.com", start).unwrap();
    rl.check_and_record_at("a@example.com", start).unwrap();
    assert!(rl.check_and_record_at("a@example.com", start).is_err());

    let later = start + Duration::from_secs(61);
    assert!(rl.check_and_record_at("a@example.com", later).is_ok());
}

#[test]
fn zero_limit_rejects_everything() {
    let rl = limiter(0, 60);
    assert!(rl.check_and_record("a@example.com").is_err());
}

#[test]
fn clones_share_state() {
    let rl = limiter(1, 60);
    let clone = rl.clone();
    let now = Instant::now();

    rl.check_and_record_at("a@example.com", now).unwrap();
    assert!(clone.check_and_record_at("a@example.com", now).is_err());
}

#[test]
fn idle_keys_are_evicted_once_their_window_passes() {
    let rl = limiter(1, 60);
    let start = Instant::now();

    for i in 0..1000 {
        rl.check_and_record_at(&format!("user{i}@example.com"), start).unwrap();
    }
    assert_eq!(rl.inner.lock().unwrap().len(), 1000);

    let later = start + Duration::from_secs(3600);
    rl.check_and_record_at("late@example.com", later).unwrap();
    let inner = rl.inner.lock().unwrap();
    assert_eq!(inner.len(), 1);
    assert!(inner.contains_key("late@example.com"));
}
