//! Outbound email.
//!
//! Route handlers only see the `Mailer` trait; `ResendMailer` is the
//! production implementation and tests substitute a recording mock.

use async_trait::async_trait;
use resend_rs::Resend;
use resend_rs::types::CreateEmailBaseOptions;

use crate::config::MailConfig;

const ACCESS_CODE_TEMPLATE: &str = include_str!("../../templates/access_code.html");
const CONTACT_NOTICE_TEMPLATE: &str = include_str!("../../templates/contact_notice.html");

#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    #[error("email delivery failed: {0}")]
    Delivery(String),
}

/// One rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one message.
    ///
    /// # Errors
    ///
    /// Returns [`MailerError::Delivery`] if the provider refuses the message.
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailerError>;
}

pub struct ResendMailer {
    client: Resend,
    from: String,
}

impl ResendMailer {
    #[must_use]
    pub fn new(config: &MailConfig) -> Self {
        Self { client: Resend::new(&config.api_key), from: config.from.clone() }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailerError> {
        let to = [email.to.as_str()];
        let options = CreateEmailBaseOptions::new(&self.from, to, &email.subject).with_html(&email.html);
        self.client
            .emails
            .send(options)
            .await
            .map_err(|e| MailerError::Delivery(e.to_string()))?;
        Ok(())
    }
}

// =============================================================================
// TEMPLATES
// =============================================================================

/// Escape user-supplied text before it lands in an HTML body.
fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[must_use]
pub fn access_code_email(to: &str, code: &str) -> OutgoingEmail {
    let html = ACCESS_CODE_TEMPLATE
        .replace("{{EMAIL}}", &escape_html(to))
        .replace("{{CODE}}", code);
    OutgoingEmail { to: to.to_owned(), subject: "Your DevDesk sign-in code".into(), html }
}

/// Studio-facing notice for a freshly submitted contact request.
#[must_use]
pub fn contact_notice_email(to: &str, name: &str, email: &str, subject: &str, message: &str) -> OutgoingEmail {
    let html = CONTACT_NOTICE_TEMPLATE
        .replace("{{NAME}}", &escape_html(name))
        .replace("{{EMAIL}}", &escape_html(email))
        .replace("{{SUBJECT}}", &escape_html(subject))
        .replace("{{MESSAGE}}", &escape_html(message));
    OutgoingEmail { to: to.to_owned(), subject: format!("New contact request: {subject}"), html }
}

#[cfg(test)]
#[path = "mailer_test.rs"]
mod tests;
