use rust_decimal::Decimal;

use crate::market_data::adapters::QuoteError;

/// A single price observation for a ticker at fetch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    ticker: String,
    price: Decimal,
}

impl Quote {
    pub fn new(ticker: impl Into<String>, price: Decimal) -> Result<Self, QuoteError> {
        let ticker = ticker.into();
        if ticker.trim().is_empty() {
            return Err(QuoteError::Parse("empty ticker".to_string()));
        }
        if price.is_sign_negative() && !price.is_zero() {
            return Err(QuoteError::Parse(format!("negative price {price} for {ticker}")));
        }
        Ok(Self { ticker, price })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn price(&self) -> Decimal {
        self.price
    }
}
