use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;
use rust_decimal::Decimal;
use tempfile::tempdir;
use tokio::sync::mpsc;

use stock_alert::market_data::adapters::{QuoteError, QuoteSource};
use stock_alert::market_data::producer::{Backoff, run_quote_producer};
use stock_alert::market_data::types::Quote;
use stock_alert::notify::{Alert, Notifier, NotifyError};
use stock_alert::pipeline::{Pipeline, run_pipeline};
use stock_alert::state::PriceStore;

mock! {
    Source {}

    #[async_trait]
    impl QuoteSource for Source {
        async fn fetch(&self, ticker: &str) -> Result<Quote, QuoteError>;
        fn name(&self) -> &str;
    }
}

mock! {
    Mailer {}

    #[async_trait]
    impl Notifier for Mailer {
        async fn send(&self, alert: &Alert) -> Result<(), NotifyError>;
    }
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Runs producer and pipeline against a scripted sequence of fetch results
/// and returns once every scripted quote has been processed.
async fn run_script(
    store: Arc<PriceStore>,
    mailer: MockMailer,
    script: Vec<Result<&'static str, &'static str>>,
) {
    let quotes = script.iter().filter(|step| step.is_ok()).count();
    let cursor = Arc::new(AtomicUsize::new(0));

    let mut source = MockSource::new();
    source.expect_name().return_const("scripted".to_string());
    source.expect_fetch().returning(move |ticker| {
        match script.get(cursor.fetch_add(1, Ordering::SeqCst)) {
            Some(Ok(price)) => Quote::new(ticker, dec(price)),
            Some(Err(msg)) => Err(QuoteError::Network(msg.to_string())),
            None => Err(QuoteError::Network("script exhausted".into())),
        }
    });

    let (tx, mut rx) = mpsc::channel(1);
    let producer = tokio::spawn(run_quote_producer(
        Arc::new(source),
        "AAPL".to_string(),
        tx,
        Backoff::new(Duration::from_millis(1), Duration::from_millis(5)),
    ));

    // relay exactly the scripted quotes so the pipeline's channel can close
    let pipeline = Pipeline::new(store, Arc::new(mailer), "me@example.com", Duration::ZERO);
    let (pipe_tx, pipe_rx) = mpsc::channel(1);
    let consumer = tokio::spawn(run_pipeline(pipe_rx, pipeline));
    for _ in 0..quotes {
        let quote = rx.recv().await.unwrap();
        pipe_tx.send(quote).await.unwrap();
    }
    drop(pipe_tx);

    consumer.await.unwrap();
    producer.abort();
}

#[tokio::test]
async fn end_to_end_alerts_only_on_large_moves() {
    let dir = tempdir().unwrap();
    let store = Arc::new(PriceStore::new(dir.path().join("prices.csv")));
    store.update("AAPL", dec("100")).await.unwrap();

    let alerts = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = alerts.clone();
    let mut mailer = MockMailer::new();
    mailer.expect_send().returning(move |alert| {
        seen.lock().unwrap().push(alert.clone());
        Ok(())
    });

    // 100 -> 103 (3%, quiet) -> fetch error -> 110 (~6.8%, alert)
    run_script(store.clone(), mailer, vec![Ok("103"), Err("timeout"), Ok("110")]).await;

    assert_eq!(store.get_previous("AAPL").await, dec("110"));
    let alerts = alerts.lock().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].subject, "Stock Alert: AAPL");
}

#[tokio::test]
async fn notifier_failure_does_not_roll_back_store() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("prices.csv");
    let store = Arc::new(PriceStore::new(&path));

    let mut mailer = MockMailer::new();
    mailer
        .expect_send()
        .returning(|_| Err(NotifyError::Send("550 rejected".into())));

    run_script(store, mailer, vec![Ok("50")]).await;

    let reopened = PriceStore::new(&path);
    assert_eq!(reopened.get_previous("AAPL").await, dec("50"));
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "ticker,price\nAAPL,50\n"
    );
}
