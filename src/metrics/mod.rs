pub mod prometheus;

pub use prometheus::{
    init_metrics_server, record_alert, record_change, record_fetch, record_pipeline_error,
};
