use super::*;

#[test]
fn normalize_email_accepts_basic_address() {
    assert_eq!(normalize_email("  USER@Example.com "), Some("user@example.com".to_owned()));
}

#[test]
fn normalize_email_rejects_invalid_values() {
    assert_eq!(normalize_email(""), None);
    assert_eq!(normalize_email("user"), None);
    assert_eq!(normalize_email("@example.com"), None);
    assert_eq!(normalize_email("user@"), None);
    assert_eq!(normalize_email("a@b@c"), None);
}

#[test]
fn normalize_code_accepts_digits_and_strips_spaces() {
    assert_eq!(normalize_code("123456"), Some("123456".to_owned()));
    assert_eq!(normalize_code(" 123 456\n"), Some("123456".to_owned()));
}

#[test]
fn normalize_code_rejects_bad_shapes() {
    assert_eq!(normalize_code("12345"), None);
    assert_eq!(normalize_code("1234567"), None);
    assert_eq!(normalize_code("12a456"), None);
    assert_eq!(normalize_code(""), None);
}

#[test]
fn generate_access_code_is_six_digits() {
    for _ in 0..50 {
        let code = generate_access_code();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(normalize_code(&code), Some(code));
    }
}

#[test]
fn hash_access_code_is_stable_hex() {
    let a = hash_access_code("123456");
    let b = hash_access_code("123456");
    let c = hash_access_code("123457");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.len(), 64);
    assert_eq!(hash_access_code(""), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
}

#[test]
fn name_from_email_uses_local_part() {
    assert_eq!(name_from_email("ada@example.com"), "ada");
    assert_eq!(name_from_email("@example.com"), "user");
}
