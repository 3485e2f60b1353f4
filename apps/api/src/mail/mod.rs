//! Outgoing email. `AppState` holds an `Arc<dyn Mailer>`:
//! `SmtpMailer` when SMTP is configured, otherwise `LogMailer` (dev).

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

pub mod smtp;

pub use smtp::SmtpMailer;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid address '{0}'")]
    Address(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError>;
}

/// Logs messages instead of delivering them. Used when no SMTP relay is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        info!(
            to = %email.to,
            subject = %email.subject,
            "SMTP not configured; email not delivered:\n{}",
            email.text_body
        );
        Ok(())
    }
}

/// Builds the verification link the frontend routes to `GET /api/auth/verify-email/:token`.
pub fn verification_link(frontend_url: &str, token: &str) -> String {
    format!("{}/verify-email/{token}", frontend_url.trim_end_matches('/'))
}

/// `name` is user-supplied; both values are escaped before they reach the HTML body.
pub fn verification_email(to: &str, name: &str, link: &str) -> OutgoingEmail {
    let html_name = html_escape::encode_text(name);
    let html_link = html_escape::encode_double_quoted_attribute(link);
    OutgoingEmail {
        to: to.to_string(),
        subject: "Verify your email address".to_string(),
        html_body: format!(
            "<p>Hi {html_name},</p>\
             <p>Thanks for signing up. Please confirm your email address by clicking the link below:</p>\
             <p><a href=\"{html_link}\">Verify my email</a></p>\
             <p>This link expires in 24 hours. If you did not create an account, you can ignore this email.</p>"
        ),
        text_body: format!(
            "Hi {name},\n\nPlease confirm your email address by opening this link:\n{link}\n\n\
             This link expires in 24 hours."
        ),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_link_trims_trailing_slash() {
        assert_eq!(
            verification_link("http://localhost:5173/", "abc"),
            "http://localhost:5173/verify-email/abc"
        );
    }

    #[test]
    fn test_verification_email_contains_link() {
        let email = verification_email("ada@example.com", "Ada", "http://x/verify-email/abc");
        assert!(email.html_body.contains("http://x/verify-email/abc"));
        assert!(email.text_body.contains("http://x/verify-email/abc"));
    }

    #[test]
    fn test_verification_email_escapes_markup_in_name() {
        let email = verification_email(
            "ada@example.com",
            "<a href=\"http://evil.example\">Click</a>",
            "http://x/verify-email/abc",
        );
        assert!(email.html_body.contains("Hi &lt;a href="));
        assert!(!email.html_body.contains("<a href=\"http://evil.example\">"));
        assert!(email.text_body.contains("<a href=\"http://evil.example\">Click</a>"));
    }

    #[test]
    fn test_verification_email_escapes_quotes_in_link() {
        let email = verification_email("ada@example.com", "Ada", "http://x/\"onmouseover=\"x");
        assert!(email.html_body.contains("http://x/&quot;onmouseover=&quot;x"));
    }
}
