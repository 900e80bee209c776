pub mod change;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::market_data::types::Quote;
use crate::metrics;
use crate::notify::{Alert, Notifier, NotifyError};
use crate::state::{PriceStore, StoreError};
use change::{exceeds_threshold, percent_change};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("change from {previous} to {price} for {ticker} is out of range")]
    Overflow {
        ticker: String,
        previous: Decimal,
        price: Decimal,
    },
}

impl PipelineError {
    fn kind(&self) -> &'static str {
        match self {
            PipelineError::Store(_) => "store",
            PipelineError::Notify(_) => "notify",
            PipelineError::Overflow { .. } => "overflow",
        }
    }
}

/// What happened to a single quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub previous: Decimal,
    pub change: Decimal,
    pub alerted: bool,
}

/// Compares each quote with the stored price, records it, and alerts on
/// large moves.
pub struct Pipeline {
    store: Arc<PriceStore>,
    notifier: Arc<dyn Notifier>,
    identity: String,
    notify_backoff: Duration,
}

impl Pipeline {
    /// `identity` is the mailbox alerts are sent from and to.
    pub fn new(
        store: Arc<PriceStore>,
        notifier: Arc<dyn Notifier>,
        identity: impl Into<String>,
        notify_backoff: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            identity: identity.into(),
            notify_backoff,
        }
    }

    /// The store update is committed before any alert goes out, so a failed
    /// send still leaves the new price recorded.
    pub async fn process(&self, quote: &Quote) -> Result<Outcome, PipelineError> {
        let ticker = quote.ticker();
        let price = quote.price();

        let previous = self.store.get_previous(ticker).await;
        let change = percent_change(previous, price);

        self.store.update(ticker, price).await?;

        let change = change.ok_or_else(|| PipelineError::Overflow {
            ticker: ticker.to_string(),
            previous,
            price,
        })?;
        metrics::record_change(ticker, change.to_f64().unwrap_or_default());

        if !exceeds_threshold(change) {
            debug!(%ticker, %previous, %price, %change, "change within threshold");
            return Ok(Outcome { previous, change, alerted: false });
        }

        info!(%ticker, %previous, %price, %change, "price moved past threshold, sending alert");
        let alert = Alert::price_change(&self.identity, ticker, change);
        if let Err(err) = self.notifier.send(&alert).await {
            warn!(%ticker, error = %err, "alert delivery failed");
            sleep(self.notify_backoff).await;
            return Err(err.into());
        }

        metrics::record_alert(ticker);
        Ok(Outcome { previous, change, alerted: true })
    }
}

/// Consumes quotes from the handoff channel until it closes.
/// Errors are logged and the next quote is processed as usual.
pub async fn run_pipeline(mut rx: mpsc::Receiver<Quote>, pipeline: Pipeline) {
    info!("pipeline started");

    while let Some(quote) = rx.recv().await {
        if let Err(err) = pipeline.process(&quote).await {
            metrics::record_pipeline_error(err.kind());
            warn!(ticker = %quote.ticker(), error = %err, "failed to process quote");
        }
    }

    info!("handoff channel closed, pipeline shutting down");
}
