//! Contact requests submitted from the dashboard.
//!
//! A request is stored as `pending` with no admin response; the studio
//! answers out of band and fills `admin_response` later.

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::email_auth::normalize_email;

pub const STATUS_PENDING: &str = "pending";

#[derive(Debug, thiserror::Error)]
pub enum ContactError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("invalid email")]
    InvalidEmail,
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Submitted form body. Fields default to empty so a missing field reports
/// as a validation error rather than a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
}

/// Form after trimming and email normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidContact {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub status: String,
    pub admin_response: Option<String>,
    /// Milliseconds since Unix epoch.
    pub created_at: i64,
}

fn required(value: &str, field: &'static str) -> Result<String, ContactError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ContactError::MissingField(field));
    }
    Ok(trimmed.to_owned())
}

impl ContactForm {
    /// # Errors
    ///
    /// Returns the first missing field in form order, or
    /// [`ContactError::InvalidEmail`].
    pub fn validate(&self) -> Result<ValidContact, ContactError> {
        let name = required(&self.name, "name")?;
        let email = required(&self.email, "email")?;
        let subject = required(&self.subject, "subject")?;
        let message = required(&self.message, "message")?;
        let email = normalize_email(&email).ok_or(ContactError::InvalidEmail)?;
        Ok(ValidContact { name, email, subject, message })
    }
}

fn contact_from_row(row: &PgRow) -> ContactRequest {
    ContactRequest {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        email: row.get("email"),
        subject: row.get("subject"),
        message: row.get("message"),
        status: row.get("status"),
        admin_response: row.get("admin_response"),
        created_at: row.get("created_ms"),
    }
}

const CONTACT_COLUMNS: &str = "id, user_id, name, email, subject, message, status, admin_response, \
     (extract(epoch FROM created_at) * 1000)::bigint AS created_ms";

/// Store a validated contact request for `user_id`.
///
/// # Errors
///
/// Returns a database error if the insert fails.
pub async fn submit_contact(pool: &PgPool, user_id: Uuid, contact: &ValidContact) -> Result<ContactRequest, ContactError> {
    let sql = format!(
        "INSERT INTO contacts (user_id, name, email, subject, message, status)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING {CONTACT_COLUMNS}"
    );
    let row = sqlx::query(&sql)
        .bind(user_id)
        .bind(&contact.name)
        .bind(&contact.email)
        .bind(&contact.subject)
        .bind(&contact.message)
        .bind(STATUS_PENDING)
        .fetch_one(pool)
        .await?;
    Ok(contact_from_row(&row))
}

/// All requests filed by `user_id`, newest first.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_contacts(pool: &PgPool, user_id: Uuid) -> Result<Vec<ContactRequest>, ContactError> {
    let sql = format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE user_id = $1 ORDER BY created_at DESC, id DESC");
    let rows = sqlx::query(&sql).bind(user_id).fetch_all(pool).await?;
    Ok(rows.iter().map(contact_from_row).collect())
}

#[cfg(test)]
#[path = "contact_test.rs"]
mod tests;
