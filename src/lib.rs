//! Polls a quote source for one ticker, records each price, and mails an
//! alert when the price moves more than 5% against the last recorded value.
//!
//! A producer task fetches quotes and hands them one at a time over a
//! single-slot channel to the pipeline task, which owns all store writes.

pub mod config;
pub mod market_data;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod state;
