pub mod yahoo;

use async_trait::async_trait;
use thiserror::Error;

use crate::market_data::types::Quote;

#[derive(Debug, Error)]
pub enum QuoteError {
    /// Provider unreachable, timed out, or answered with a non-2xx status.
    #[error("network error: {0}")]
    Network(String),

    /// Body was not JSON, or the price field was missing or not a decimal.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Anything that can produce the current price for a ticker.
///
/// Implementations do not retry; the producer loop decides what to do with a
/// failure.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch(&self, ticker: &str) -> Result<Quote, QuoteError>;

    fn name(&self) -> &str;
}
