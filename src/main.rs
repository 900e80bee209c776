use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stock_alert::config::{Cli, Config};
use stock_alert::market_data::adapters::yahoo::YahooQuoteSource;
use stock_alert::market_data::producer::{Backoff, run_quote_producer};
use stock_alert::metrics;
use stock_alert::notify::SmtpNotifier;
use stock_alert::pipeline::{Pipeline, run_pipeline};
use stock_alert::state::PriceStore;

/// Producer→pipeline handoff. One slot: fetching waits until the previous
/// quote has been taken.
const HANDOFF_CHANNEL_BUFFER: usize = 1;

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env().context("failed to load configuration")?;
    config.apply_cli(cli).context("invalid command-line arguments")?;

    init_tracing(&config.log_level);
    info!(ticker = %config.ticker, store = %config.store_path.display(), "stock-alert starting");

    if let Some(port) = config.metrics_port {
        metrics::init_metrics_server(port).context("failed to start metrics exporter")?;
        info!(port, "metrics exporter listening");
    }

    let store = PriceStore::open(&config.store_path)
        .await
        .with_context(|| format!("failed to open price store {}", config.store_path.display()))?;
    let source = YahooQuoteSource::new(config.quote_base_url.clone(), config.http_timeout)
        .context("failed to build quote client")?;
    let notifier = SmtpNotifier::new(
        &config.smtp_host,
        config.smtp_port,
        config.credentials.clone(),
        config.http_timeout,
    )
    .context("failed to build mail transport")?;

    let pipeline = Pipeline::new(
        Arc::new(store),
        Arc::new(notifier),
        config.credentials.email.clone(),
        config.notify_backoff,
    );
    let backoff = Backoff::new(config.fetch_backoff, config.fetch_backoff_max);

    let (tx, rx) = mpsc::channel(HANDOFF_CHANNEL_BUFFER);

    let producer_handle = tokio::spawn(run_quote_producer(
        Arc::new(source),
        config.ticker.clone(),
        tx,
        backoff,
    ));
    let pipeline_handle = tokio::spawn(run_pipeline(rx, pipeline));

    tokio::select! {
        res = producer_handle => {
            match res {
                Ok(()) => warn!("quote producer exited"),
                Err(err) => warn!(error = %err, "quote producer task panicked"),
            }
        }
        res = pipeline_handle => {
            match res {
                Ok(()) => warn!("pipeline task exited"),
                Err(err) => warn!(error = %err, "pipeline task panicked"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl-C, shutting down");
        }
    }

    Ok(())
}
