use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::{ContentTransferEncoding, ContentType};
use lettre::message::{Mailbox, SinglePart};
use lettre::transport::smtp;
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use super::traits::{Alert, Notifier, NotifyError};
use crate::config::Credentials;

/// Mails alerts through a relay, upgrading to TLS with STARTTLS before
/// authenticating.
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotifier {
    pub fn new(
        host: &str,
        port: u16,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| NotifyError::Connect(format!("{host}: {e}")))?
            .port(port)
            .credentials(SmtpCredentials::new(credentials.email, credentials.password))
            .timeout(Some(timeout))
            .build();

        Ok(Self { transport })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let message = build_message(alert)?;

        self.transport.send(message).await.map_err(classify)?;

        info!(to = %alert.to, subject = %alert.subject, "alert mailed");
        Ok(())
    }
}

fn build_message(alert: &Alert) -> Result<Message, NotifyError> {
    let from: Mailbox = alert
        .from
        .parse()
        .map_err(|e| NotifyError::Send(format!("invalid sender {:?}: {e}", alert.from)))?;
    let to: Mailbox = alert
        .to
        .parse()
        .map_err(|e| NotifyError::Send(format!("invalid recipient {:?}: {e}", alert.to)))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(alert.subject.clone())
        .singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .header(ContentTransferEncoding::Base64)
                .body(alert.body.clone()),
        )
        .map_err(|e| NotifyError::Send(e.to_string()))
}

fn classify(err: smtp::Error) -> NotifyError {
    match err.status() {
        Some(code) => classify_reply(&code.to_string(), err.to_string()),
        None => NotifyError::Connect(err.to_string()),
    }
}

/// 53x replies (530, 534, 535, 538) are authentication failures.
fn classify_reply(code: &str, detail: String) -> NotifyError {
    if code.starts_with("53") {
        NotifyError::Auth(detail)
    } else {
        NotifyError::Send(detail)
    }
}
