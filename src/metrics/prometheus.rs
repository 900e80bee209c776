use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus HTTP exporter on the given port.
/// After this call, any metrics recorded via the `metrics` crate
/// macros (counter!, histogram!) are automatically exported at /metrics.
/// Without it the recording helpers below are no-ops.
pub fn init_metrics_server(port: u16) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
}

// ── Producer metrics ─────────────────────────────────────────────

pub fn record_fetch(outcome: &'static str) {
    counter!("quote_fetches_total", "outcome" => outcome).increment(1);
}

// ── Pipeline metrics ─────────────────────────────────────────────

pub fn record_change(ticker: &str, change_percent: f64) {
    histogram!("price_change_percent", "ticker" => ticker.to_string()).record(change_percent);
}

pub fn record_alert(ticker: &str) {
    counter!("price_alerts_total", "ticker" => ticker.to_string()).increment(1);
}

pub fn record_pipeline_error(kind: &'static str) {
    counter!("pipeline_errors_total", "kind" => kind).increment(1);
}
