//! # Best-Effort Notification Mailer
//!
//! The lifecycle engine sends a handful of notification emails
//! (new-user confirmation links, email-change verification, password
//! reset links, password-change/email-change acknowledgements). None of
//! these sends may invert the outcome of the mutation that triggered
//! them: the mutation is always committed first, and a transport
//! failure here is logged and swallowed, never propagated as the
//! enclosing request's error.
//!
//! [`LoggingMailer`] is the default implementation: it renders the
//! message and logs it at `info` level instead of calling out to an
//! SMTP/API transport, which keeps local development and tests free of
//! a real mail dependency. A production deployment swaps in another
//! [`Mailer`] implementation.

use async_trait::async_trait;

/// A single outbound notification, already rendered.
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub to: String,
    /// Stable label used for logging (`"newuser"`, `"email"`, `"forgotpass"`,
    /// `"passchange"`, ...), not shown to the recipient.
    pub action: &'static str,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends `message`. Implementations should treat failures as
    /// recoverable, since callers invoke this only in best-effort contexts
    /// and will log-and-continue on `Err`.
    async fn send(&self, message: MailMessage) -> Result<(), MailError>;
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail transport error: {0}")]
    Transport(String),
}

/// Logs the rendered message instead of delivering it.
#[derive(Debug, Default, Clone)]
pub struct LoggingMailer;

#[async_trait]
impl Mailer for LoggingMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        tracing::info!(
            to = %message.to,
            action = message.action,
            subject = %message.subject,
            "notification email (logging transport)"
        );
        Ok(())
    }
}

/// Substitutes `{{.Userid}}` and `{{.Key}}` placeholders into a
/// configured URL template, matching the identity core's email URL
/// config format.
pub fn render_url_template(template: &str, userid: &str, key: &str) -> String {
    template
        .replace("{{.Userid}}", userid)
        .replace("{{.Key}}", key)
}

/// Sends `message` via `mailer`, logging and swallowing any failure so
/// the caller's authoritative mutation is never undone by a transport
/// hiccup.
pub async fn send_best_effort(mailer: &dyn Mailer, message: MailMessage) {
    let action = message.action;
    let to = message.to.clone();
    if let Err(e) = mailer.send(message).await {
        tracing::warn!(error = %e, action, to = %to, "best-effort notification email failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_template_substitutes_both_placeholders() {
        let rendered = render_url_template(
            "http://localhost:8080/u/email/verify?userid={{.Userid}}&key={{.Key}}",
            "user1",
            "abc123",
        );
        assert_eq!(
            rendered,
            "http://localhost:8080/u/email/verify?userid=user1&key=abc123"
        );
    }

    #[tokio::test]
    async fn logging_mailer_always_succeeds() {
        let mailer = LoggingMailer;
        let result = mailer
            .send(MailMessage {
                to: "user@example.com".to_string(),
                action: "newuser",
                subject: "Confirm your account".to_string(),
                body: "click here".to_string(),
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn send_best_effort_swallows_failures() {
        struct FailingMailer;
        #[async_trait]
        impl Mailer for FailingMailer {
            async fn send(&self, _message: MailMessage) -> Result<(), MailError> {
                Err(MailError::Transport("connection refused".to_string()))
            }
        }

        send_best_effort(
            &FailingMailer,
            MailMessage {
                to: "user@example.com".to_string(),
                action: "passchange",
                subject: "Password changed".to_string(),
                body: "".to_string(),
            },
        )
        .await;
    }
}
