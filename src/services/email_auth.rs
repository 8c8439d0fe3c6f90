//! Email one-time-passcode sign-in.
//!
//! A code is six decimal digits, stored only as its SHA-256 hash, valid for
//! ten minutes and burned after five wrong guesses. Requesting a new code
//! invalidates every earlier unconsumed code for the same address.

use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::session::bytes_to_hex;

const CODE_LEN: usize = 6;
const MAX_FAILED_ATTEMPTS: i32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum EmailAuthError {
    #[error("invalid email")]
    InvalidEmail,
    #[error("invalid code")]
    InvalidCode,
    #[error("expired or incorrect code")]
    VerificationFailed,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(normalized)
}

/// Accepts the code with surrounding whitespace or inner spaces, as users
/// paste it from mail clients.
#[must_use]
pub fn normalize_code(code: &str) -> Option<String> {
    let normalized: String = code.chars().filter(|c| !c.is_whitespace()).collect();
    if normalized.len() != CODE_LEN || !normalized.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(normalized)
}

#[must_use]
pub fn generate_access_code() -> String {
    let value: u32 = rand::rng().random_range(0..1_000_000);
    format!("{value:06}")
}

#[must_use]
pub fn hash_access_code(code: &str) -> String {
    let digest = Sha256::digest(code.as_bytes());
    bytes_to_hex(&digest)
}

fn name_from_email(email: &str) -> String {
    email
        .split('@')
        .next()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or("user")
        .to_owned()
}

/// Upsert the user for `email`, replace any pending code, and return the new
/// plaintext code for delivery.
///
/// # Errors
///
/// Returns [`EmailAuthError::InvalidEmail`] for malformed addresses, or a
/// database error.
pub async fn request_access_code(pool: &PgPool, email: &str) -> Result<String, EmailAuthError> {
    let normalized = normalize_email(email).ok_or(EmailAuthError::InvalidEmail)?;
    let name = name_from_email(&normalized);

    let mut tx = pool.begin().await?;

    sqlx::query(
        r"INSERT INTO users (email, name)
          VALUES ($1, $2)
          ON CONFLICT (email) DO NOTHING",
    )
    .bind(&normalized)
    .bind(name)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM email_login_codes WHERE email = $1 AND consumed_at IS NULL")
        .bind(&normalized)
        .execute(&mut *tx)
        .await?;

    let code = generate_access_code();
    sqlx::query("INSERT INTO email_login_codes (email, code_hash) VALUES ($1, $2)")
        .bind(&normalized)
        .bind(hash_access_code(&code))
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(code)
}

/// Consume the newest live code for `email` if `code` matches, marking the
/// address verified.
///
/// # Errors
///
/// Returns [`EmailAuthError::VerificationFailed`] when no live code matches;
/// the failed attempt is counted against the pending code.
pub async fn verify_access_code(pool: &PgPool, email: &str, code: &str) -> Result<Uuid, EmailAuthError> {
    let normalized_email = normalize_email(email).ok_or(EmailAuthError::InvalidEmail)?;
    let normalized_code = normalize_code(code).ok_or(EmailAuthError::InvalidCode)?;
    let code_hash = hash_access_code(&normalized_code);

    let consumed = sqlx::query(
        r"UPDATE email_login_codes
          SET consumed_at = now()
          WHERE id = (
              SELECT id
              FROM email_login_codes
              WHERE email = $1
                AND consumed_at IS NULL
                AND expires_at > now()
              ORDER BY created_at DESC
              LIMIT 1
          )
          AND code_hash = $2
          RETURNING id",
    )
    .bind(&normalized_email)
    .bind(&code_hash)
    .fetch_optional(pool)
    .await?;

    if consumed.is_none() {
        sqlx::query(
            r"UPDATE email_login_codes
              SET attempts = attempts + 1,
                  consumed_at = CASE WHEN attempts + 1 >= $2 THEN now() ELSE consumed_at END
              WHERE id = (
                  SELECT id
                  FROM email_login_codes
                  WHERE email = $1
                    AND consumed_at IS NULL
                    AND expires_at > now()
                  ORDER BY created_at DESC
                  LIMIT 1
              )",
        )
        .bind(&normalized_email)
        .bind(MAX_FAILED_ATTEMPTS)
        .execute(pool)
        .await?;
        return Err(EmailAuthError::VerificationFailed);
    }

    let row = sqlx::query("UPDATE users SET email_verified = true WHERE email = $1 RETURNING id")
        .bind(&normalized_email)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Err(EmailAuthError::VerificationFailed);
    };
    Ok(row.get("id"))
}

#[cfg(test)]
#[path = "email_auth_test.rs"]
mod tests;
