use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// Could not reach the relay or establish the encrypted session.
    #[error("connect error: {0}")]
    Connect(String),

    /// The relay rejected the credentials.
    #[error("auth error: {0}")]
    Auth(String),

    /// The relay refused the message, or the message could not be built.
    #[error("send error: {0}")]
    Send(String),
}

/// A single plain-text message to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Alert {
    /// Price-move alert, sent from and to the same mailbox. The change is
    /// printed without trailing zeros.
    pub fn price_change(identity: &str, ticker: &str, change: Decimal) -> Self {
        let change = change.normalize();
        Self {
            from: identity.to_string(),
            to: identity.to_string(),
            subject: format!("Stock Alert: {ticker}"),
            body: format!(
                "The price of {ticker} has changed by {change}% compared to the previous price."
            ),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers `alert`. No retry; failures go straight back to the caller.
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError>;
}
