pub mod contact;
pub mod email_auth;
pub mod mailer;
pub mod session;
