use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::market_data::adapters::QuoteSource;
use crate::market_data::types::Quote;
use crate::metrics;

/// Bounded exponential delay applied after consecutive fetch failures.
///
/// A zero base disables the delay entirely, which retries immediately.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            current: base,
        }
    }

    /// Delay to wait now; doubles the next one up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

/// Fetches quotes forever and hands each one to the pipeline.
///
/// `send` waits while the single slot is occupied, so fetching never runs
/// more than one quote ahead of processing. Returns once the consumer side has
/// been dropped.
pub async fn run_quote_producer(
    source: Arc<dyn QuoteSource>,
    ticker: String,
    tx: mpsc::Sender<Quote>,
    mut backoff: Backoff,
) {
    info!(source = source.name(), %ticker, "quote producer started");

    loop {
        match source.fetch(&ticker).await {
            Ok(quote) => {
                backoff.reset();
                metrics::record_fetch("ok");
                debug!(%ticker, price = %quote.price(), "quote fetched");

                if tx.send(quote).await.is_err() {
                    warn!("handoff channel closed, stopping quote producer");
                    return;
                }
            }
            Err(err) => {
                metrics::record_fetch("error");
                let delay = backoff.next_delay();
                let retry_in_ms = delay.as_millis() as u64;
                warn!(%ticker, error = %err, retry_in_ms, "quote fetch failed");

                if tx.is_closed() {
                    warn!("handoff channel closed, stopping quote producer");
                    return;
                }
                if delay.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    sleep(delay).await;
                }
            }
        }
    }
}
