use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use super::{QuoteError, QuoteSource};
use crate::market_data::types::Quote;

const USER_AGENT: &str = "stock-alert/0.1";

/// JSON pointer to `chart.result[0].meta.regularMarketPrice`.
const PRICE_POINTER: &str = "/chart/result/0/meta/regularMarketPrice";

/// Quote source backed by the Yahoo Finance v8 chart endpoint.
pub struct YahooQuoteSource {
    client: Client,
    base_url: Url,
}

impl YahooQuoteSource {
    /// `base_url` is validated when the configuration is loaded.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, QuoteError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| QuoteError::Network(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    fn chart_url(&self, ticker: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v8", "finance", "chart", ticker]);
        }
        url.query_pairs_mut()
            .append_pair("range", "1d")
            .append_pair("interval", "1m");
        url
    }
}

#[async_trait]
impl QuoteSource for YahooQuoteSource {
    async fn fetch(&self, ticker: &str) -> Result<Quote, QuoteError> {
        let url = self.chart_url(ticker);
        debug!(%url, "requesting quote");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| QuoteError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QuoteError::Network(format!("{ticker}: provider returned {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| QuoteError::Network(e.to_string()))?;

        Quote::new(ticker, extract_price(&body)?)
    }

    fn name(&self) -> &str {
        "yahoo"
    }
}

/// Pulls the regular-market price out of a chart response body.
pub fn extract_price(body: &str) -> Result<Decimal, QuoteError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| QuoteError::Parse(format!("malformed JSON: {e}")))?;

    let raw = match value.pointer(PRICE_POINTER) {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(QuoteError::Parse(format!(
                "regularMarketPrice is not numeric: {other}"
            )));
        }
        None => {
            return Err(QuoteError::Parse(
                "regularMarketPrice missing from response".to_string(),
            ));
        }
    };

    Decimal::from_str(raw.trim())
        .or_else(|_| Decimal::from_scientific(raw.trim()))
        .map_err(|_| QuoteError::Parse(format!("regularMarketPrice {raw:?} is not a decimal")))
}
