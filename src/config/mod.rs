use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use reqwest::Url;
use thiserror::Error;

pub const DEFAULT_TICKER: &str = "AAPL";
pub const DEFAULT_STORE_PATH: &str = "prices.csv";
pub const DEFAULT_QUOTE_BASE_URL: &str = "https://query1.finance.yahoo.com";
pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// File the mail credentials are conventionally kept in, next to the binary.
const CREDENTIALS_FILE: &str = "creds.env";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Mail account used both to authenticate with the relay and as the
/// sender/recipient of every alert.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub ticker: String,
    pub store_path: PathBuf,
    pub quote_base_url: Url,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub http_timeout: Duration,
    pub fetch_backoff: Duration,
    pub fetch_backoff_max: Duration,
    pub notify_backoff: Duration,
    pub metrics_port: Option<u16>,
    pub log_level: String,
}

/// Command-line overrides. Anything left unset falls back to the environment.
#[derive(Debug, Default, Parser)]
#[command(name = "stock-alert", about = "Watch a ticker and mail an alert on large price moves")]
pub struct Cli {
    /// Ticker symbol to watch (overrides TICKER)
    #[arg(long)]
    pub ticker: Option<String>,

    /// Path of the price record file (overrides PRICE_STORE_PATH)
    #[arg(long)]
    pub store: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // dotenvy loads .env, but doesn't override already-set env vars
        dotenvy::from_filename(CREDENTIALS_FILE).ok();
        dotenvy::dotenv().ok();

        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let email = var("EMAIL").ok_or(ConfigError::Missing("EMAIL"))?;
        let password = var("PASSWORD").ok_or(ConfigError::Missing("PASSWORD"))?;

        let ticker = normalize_ticker(&var("TICKER").unwrap_or_else(|| DEFAULT_TICKER.to_string()))?;

        Ok(Self {
            credentials: Credentials {
                email: email.trim().to_string(),
                password,
            },
            ticker,
            store_path: var("PRICE_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
            quote_base_url: parse_base_url(
                &var("QUOTE_BASE_URL").unwrap_or_else(|| DEFAULT_QUOTE_BASE_URL.to_string()),
            )?,
            smtp_host: var("SMTP_HOST").unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
            smtp_port: parse_or("SMTP_PORT", var("SMTP_PORT"), DEFAULT_SMTP_PORT)?,
            http_timeout: Duration::from_secs(parse_or("HTTP_TIMEOUT_SECS", var("HTTP_TIMEOUT_SECS"), 10)?),
            fetch_backoff: Duration::from_millis(parse_or("FETCH_BACKOFF_MS", var("FETCH_BACKOFF_MS"), 0)?),
            fetch_backoff_max: Duration::from_millis(parse_or(
                "FETCH_BACKOFF_MAX_MS",
                var("FETCH_BACKOFF_MAX_MS"),
                30_000,
            )?),
            notify_backoff: Duration::from_millis(parse_or("NOTIFY_BACKOFF_MS", var("NOTIFY_BACKOFF_MS"), 2_000)?),
            metrics_port: var("METRICS_PORT")
                .map(|v| parse_or("METRICS_PORT", Some(v), 0))
                .transpose()?,
            log_level: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn apply_cli(&mut self, cli: Cli) -> Result<(), ConfigError> {
        if let Some(ticker) = cli.ticker {
            self.ticker = normalize_ticker(&ticker)?;
        }
        if let Some(store) = cli.store {
            self.store_path = store;
        }
        Ok(())
    }
}

fn normalize_ticker(raw: &str) -> Result<String, ConfigError> {
    let ticker = raw.trim().to_uppercase();
    if ticker.is_empty() {
        return Err(ConfigError::Invalid {
            name: "TICKER",
            value: raw.to_string(),
        });
    }
    Ok(ticker)
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    match Url::parse(raw.trim()) {
        Ok(url) if !url.cannot_be_a_base() && matches!(url.scheme(), "http" | "https") => Ok(url),
        _ => Err(ConfigError::Invalid {
            name: "QUOTE_BASE_URL",
            value: raw.to_string(),
        }),
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: v }),
    }
}
