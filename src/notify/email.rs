// src/notify/email.rs
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::DigestSink;
use crate::error::SinkError;
use crate::model::Digest;

pub struct EmailSink {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailSink {
    /// Build from `SMTP_HOST`, `SMTP_USER`, `SMTP_PASS`,
    /// `NOTIFY_EMAIL_FROM`, `NOTIFY_EMAIL_TO`. Returns `None` when any of
    /// them is missing or malformed; email is an optional sink.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SMTP_HOST").ok()?;
        let user = std::env::var("SMTP_USER").ok()?;
        let pass = std::env::var("SMTP_PASS").ok()?;
        let from_addr = std::env::var("NOTIFY_EMAIL_FROM").ok()?;
        let to_addr = std::env::var("NOTIFY_EMAIL_TO").ok()?;

        let creds = Credentials::new(user, pass);
        let mailer = match AsyncSmtpTransport::<Tokio1Executor>::relay(&host) {
            Ok(builder) => builder.credentials(creds).build(),
            Err(e) => {
                tracing::warn!(error = %e, "invalid SMTP_HOST, email sink disabled");
                return None;
            }
        };

        let from: Mailbox = match from_addr.parse() {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "invalid NOTIFY_EMAIL_FROM, email sink disabled");
                return None;
            }
        };
        let to: Mailbox = match to_addr.parse() {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(error = %e, "invalid NOTIFY_EMAIL_TO, email sink disabled");
                return None;
            }
        };

        Some(Self { mailer, from, to })
    }
}

#[async_trait]
impl DigestSink for EmailSink {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn deliver(&self, digest: &Digest) -> Result<(), SinkError> {
        let subject = format!("List digest: {} relevant post(s)", digest.items.len());
        let msg = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(digest.rendered.clone())
            .map_err(|e| SinkError {
                sink: self.name(),
                message: format!("build email: {e}"),
            })?;

        self.mailer.send(msg).await.map_err(|e| SinkError {
            sink: self.name(),
            message: format!("send email: {e}"),
        })?;
        Ok(())
    }
}
