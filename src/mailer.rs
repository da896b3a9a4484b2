//! Outbound mail.
//!
//! Delivery is fire-and-report-error: a sender either hands the message off
//! or returns [`MailError`]. There is no delivery confirmation.
//! [`SmtpMailer`] delivers through an SMTP relay; [`LogMailer`] is the
//! development default when no relay is configured.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("no recipients")]
    NoRecipients,
    #[error("invalid mail address: {0}")]
    InvalidAddress(String),
    #[error("invalid SMTP configuration: {0}")]
    Config(String),
    #[error("mail delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_html(&self, to: &[String], subject: &str, html_body: &str)
    -> Result<(), MailError>;
}

/// Logs messages instead of delivering them.
#[derive(Clone, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_html(
        &self,
        to: &[String],
        subject: &str,
        html_body: &str,
    ) -> Result<(), MailError> {
        if to.is_empty() {
            return Err(MailError::NoRecipients);
        }
        // The body carries a live reset link, so only its size is logged
        info!(
            to = ?to,
            subject = %subject,
            body_len = html_body.len(),
            "Mail send stub"
        );
        Ok(())
    }
}

/// How the connection to the relay is secured.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS
    #[default]
    Starttls,
    /// TLS from the first byte
    Tls,
    /// Unencrypted, for local test relays
    None,
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub security: SmtpSecurity,
}

impl SmtpConfig {
    fn validate(&self) -> Result<(), MailError> {
        let missing = if self.host.trim().is_empty() {
            Some("host")
        } else if self.port == 0 {
            Some("port")
        } else if self.username.is_empty() {
            Some("username")
        } else if self.password.is_empty() {
            Some("password")
        } else if self.from.trim().is_empty() {
            Some("from address")
        } else {
            None
        };

        match missing {
            Some(field) => Err(MailError::Config(format!("missing SMTP {}", field))),
            None => Ok(()),
        }
    }
}

// Never print the password.
impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .field("security", &self.security)
            .finish()
    }
}

/// Delivers through an authenticated SMTP relay, one connection per message.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Validate `config` and build the transport. Nothing is dialled until
    /// the first send.
    pub fn new(config: SmtpConfig) -> Result<Self, MailError> {
        config.validate()?;

        let from = parse_mailbox(&config.from)?;
        let builder = match config.security {
            SmtpSecurity::Starttls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            }
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host),
            SmtpSecurity::None => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                &config.host,
            )),
        }
        .map_err(|e| MailError::Config(e.to_string()))?;

        let transport = builder
            .port(config.port)
            .credentials(Credentials::new(config.username, config.password))
            .build();

        Ok(Self { transport, from })
    }

    fn message(&self, to: &[String], subject: &str, html_body: &str) -> Result<Message, MailError> {
        if to.is_empty() {
            return Err(MailError::NoRecipients);
        }

        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject)
            .header(ContentType::TEXT_HTML);
        for address in to {
            builder = builder.to(parse_mailbox(address)?);
        }

        builder
            .body(html_body.to_string())
            .map_err(|e| MailError::Delivery(e.to_string()))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address
        .parse()
        .map_err(|_| MailError::InvalidAddress(address.to_string()))
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_html(
        &self,
        to: &[String],
        subject: &str,
        html_body: &str,
    ) -> Result<(), MailError> {
        let message = self.message(to, subject, html_body)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Delivery(e.to_string()))?;
        info!(recipients = to.len(), subject = %subject, "Mail sent");
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMail {
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
}

/// Keeps every message in memory. Can be switched to fail every send.
#[derive(Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<SentMail>>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<SentMail> {
        self.sent().pop()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_html(
        &self,
        to: &[String],
        subject: &str,
        html_body: &str,
    ) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Delivery("recording mailer set to fail".into()));
        }
        if to.is_empty() {
            return Err(MailError::NoRecipients);
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentMail {
                to: to.to_vec(),
                subject: subject.to_string(),
                html_body: html_body.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_mailer_keeps_messages() {
        let mailer = RecordingMailer::new();
        mailer
            .send_html(&["alice@example.com".into()], "Hello", "<p>hi</p>")
            .await
            .unwrap();

        let last = mailer.last().unwrap();
        assert_eq!(last.to, vec!["alice@example.com".to_string()]);
        assert_eq!(last.subject, "Hello");
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_failing_mailer() {
        let mailer = RecordingMailer::failing();
        let result = mailer
            .send_html(&["alice@example.com".into()], "Hello", "<p>hi</p>")
            .await;
        assert!(matches!(result, Err(MailError::Delivery(_))));
        assert!(mailer.sent().is_empty());
    }

    fn smtp_config() -> SmtpConfig {
        SmtpConfig {
            host: "localhost".into(),
            port: 2525,
            username: "mailer".into(),
            password: "mailer-password".into(),
            from: "Sessiongate <no-reply@example.com>".into(),
            security: SmtpSecurity::None,
        }
    }

    #[test]
    fn test_smtp_config_requires_every_field() {
        let cases: [fn(&mut SmtpConfig); 5] = [
            |c| c.host.clear(),
            |c| c.port = 0,
            |c| c.username.clear(),
            |c| c.password.clear(),
            |c| c.from.clear(),
        ];

        for clear in cases {
            let mut config = smtp_config();
            clear(&mut config);
            assert!(matches!(
                SmtpMailer::new(config),
                Err(MailError::Config(_))
            ));
        }
    }

    #[test]
    fn test_smtp_config_rejects_bad_from_address() {
        let config = SmtpConfig {
            from: "not an address".into(),
            ..smtp_config()
        };
        assert!(matches!(
            SmtpMailer::new(config),
            Err(MailError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_smtp_config_debug_hides_password() {
        let printed = format!("{:?}", smtp_config());
        assert!(!printed.contains("mailer-password"));
    }

    #[test]
    fn test_smtp_message_is_html() {
        let mailer = SmtpMailer::new(smtp_config()).unwrap();
        let message = mailer
            .message(
                &["alice@example.com".into()],
                "Password Reset Request",
                "<p>reset</p>",
            )
            .unwrap();

        let formatted = String::from_utf8(message.formatted()).unwrap();
        assert!(formatted.contains("Subject: Password Reset Request"));
        assert!(formatted.contains("To: alice@example.com"));
        assert!(formatted.contains("no-reply@example.com"));
        assert!(formatted.contains("Content-Type: text/html"));
        assert!(formatted.contains("<p>reset</p>"));
    }

    #[tokio::test]
    async fn test_smtp_mailer_checks_recipients_before_dialling() {
        let mailer = SmtpMailer::new(smtp_config()).unwrap();

        let result = mailer.send_html(&[], "Hello", "<p>hi</p>").await;
        assert!(matches!(result, Err(MailError::NoRecipients)));

        let result = mailer
            .send_html(&["not an address".into()], "Hello", "<p>hi</p>")
            .await;
        assert!(matches!(result, Err(MailError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_log_mailer_requires_recipient() {
        let result = LogMailer.send_html(&[], "Hello", "<p>hi</p>").await;
        assert!(matches!(result, Err(MailError::NoRecipients)));
    }
}
