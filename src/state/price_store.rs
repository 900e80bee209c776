use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("price store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("price store CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid price {raw:?} recorded for {ticker}")]
    InvalidPrice { ticker: String, raw: String },
}

/// Parsed contents of the record file. Rows whose price does not parse are
/// kept apart, by ticker, with their raw text.
#[derive(Debug, Default)]
struct RecordSet {
    prices: BTreeMap<String, Decimal>,
    invalid: BTreeMap<String, String>,
}

/// Last-known price per ticker, persisted as a `ticker,price` CSV file.
///
/// Every update rewrites the whole record set to a temp file and renames it
/// over the original. Writers are serialised by an internal lock.
#[derive(Debug)]
pub struct PriceStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl PriceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Like `new`, but creates the file (header only) when it does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::new(path);
        if tokio::fs::try_exists(&store.path).await? {
            return Ok(store);
        }
        if let Some(parent) = store.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        store.write_all(&BTreeMap::new()).await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recorded price for `ticker`, or `None` if it has never been seen.
    ///
    /// Only an unreadable file or a bad row for this ticker is an error; bad
    /// rows belonging to other tickers are ignored.
    pub async fn read(&self, ticker: &str) -> Result<Option<Decimal>, StoreError> {
        let mut records = self.load().await?;
        if let Some(raw) = records.invalid.remove(ticker) {
            return Err(StoreError::InvalidPrice {
                ticker: ticker.to_string(),
                raw,
            });
        }
        Ok(records.prices.remove(ticker))
    }

    /// Previous price for `ticker`, falling back to zero.
    ///
    /// Read failures are logged and swallowed: a corrupt store reads the same
    /// as an unseen ticker, and the ticker's record is reset to zero.
    pub async fn get_previous(&self, ticker: &str) -> Decimal {
        match self.read(ticker).await {
            Ok(price) => price.unwrap_or(Decimal::ZERO),
            Err(err) => {
                warn!(%ticker, path = %self.path.display(), error = %err, "failed to read previous price, using zero");
                if let Err(err) = self.update(ticker, Decimal::ZERO).await {
                    warn!(%ticker, error = %err, "failed to reset price record");
                }
                Decimal::ZERO
            }
        }
    }

    /// Records `price` as the latest for `ticker`, keeping every other ticker
    /// whose row parses. Rows with unparsable prices are dropped.
    pub async fn update(&self, ticker: &str, price: Decimal) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let RecordSet { mut prices, invalid } = self.load().await?;
        for (other, raw) in invalid.iter().filter(|(t, _)| t.as_str() != ticker) {
            warn!(ticker = %other, %raw, "dropping unparsable price record");
        }
        prices.insert(ticker.to_string(), price);
        self.write_all(&prices).await?;

        debug!(%ticker, %price, "price record updated");
        Ok(())
    }

    /// Every valid recorded price, keyed by ticker. A missing file is an
    /// empty set.
    pub async fn snapshot(&self) -> Result<BTreeMap<String, Decimal>, StoreError> {
        Ok(self.load().await?.prices)
    }

    async fn load(&self) -> Result<RecordSet, StoreError> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(RecordSet::default()),
            Err(err) => return Err(err.into()),
        };

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(contents.as_slice());
        let mut records = RecordSet::default();
        for row in reader.records() {
            let row = match row {
                Ok(row) => row,
                Err(err) => {
                    warn!(path = %self.path.display(), error = %err, "skipping malformed price row");
                    continue;
                }
            };
            let Some(ticker) = row.get(0).map(str::trim).filter(|t| !t.is_empty()) else {
                continue;
            };
            let raw = row.get(1).unwrap_or_default();
            match Decimal::from_str(raw.trim()) {
                Ok(price) => {
                    records.invalid.remove(ticker);
                    records.prices.insert(ticker.to_string(), price);
                }
                Err(_) => {
                    records.prices.remove(ticker);
                    records.invalid.insert(ticker.to_string(), raw.to_string());
                }
            }
        }
        Ok(records)
    }

    async fn write_all(&self, records: &BTreeMap<String, Decimal>) -> Result<(), StoreError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        // header is written even when there are no rows
        writer.write_record(["ticker", "price"])?;
        for (ticker, price) in records {
            writer.write_record([ticker.as_str(), price.to_string().as_str()])?;
        }
        let bytes = writer.into_inner().map_err(|e| e.into_error())?;

        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn unseen_ticker_reads_as_zero() {
        let dir = tempdir().unwrap();
        let store = PriceStore::open(dir.path().join("prices.csv")).await.unwrap();

        assert_eq!(store.read("AAPL").await.unwrap(), None);
        assert_eq!(store.get_previous("AAPL").await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn update_round_trips_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prices.csv");
        let store = PriceStore::new(&path);

        store.update("AAPL", dec("189.84")).await.unwrap();

        let reopened = PriceStore::new(&path);
        assert_eq!(reopened.get_previous("AAPL").await, dec("189.84"));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "ticker,price\nAAPL,189.84\n");
    }

    #[tokio::test]
    async fn updates_keep_other_tickers() {
        let dir = tempdir().unwrap();
        let store = PriceStore::new(dir.path().join("prices.csv"));

        store.update("MSFT", dec("410.1")).await.unwrap();
        store.update("AAPL", dec("190")).await.unwrap();
        store.update("AAPL", dec("191")).await.unwrap();

        let all = store.snapshot().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["AAPL"], dec("191"));
        assert_eq!(all["MSFT"], dec("410.1"));
    }

    #[tokio::test]
    async fn repeated_update_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prices.csv");
        let store = PriceStore::new(&path);

        store.update("AAPL", dec("100")).await.unwrap();
        store.update("AAPL", dec("100")).await.unwrap();

        assert_eq!(store.get_previous("AAPL").await, dec("100"));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().filter(|l| l.starts_with("AAPL,")).count(), 1);
    }

    #[tokio::test]
    async fn corrupt_record_falls_back_to_zero_and_resets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prices.csv");
        std::fs::write(&path, "ticker,price\nAAPL,not-a-price\n").unwrap();
        let store = PriceStore::new(&path);

        assert!(matches!(store.read("AAPL").await, Err(StoreError::InvalidPrice { .. })));
        assert_eq!(store.get_previous("AAPL").await, Decimal::ZERO);

        // the corrective write leaves a readable zero record behind
        assert_eq!(store.read("AAPL").await.unwrap(), Some(Decimal::ZERO));
    }

    #[tokio::test]
    async fn bad_row_for_other_ticker_does_not_hide_or_drop_good_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prices.csv");
        std::fs::write(&path, "ticker,price\nAAPL,100\nMSFT,garbage\nGOOG,140.5\n").unwrap();
        let store = PriceStore::new(&path);

        assert_eq!(store.read("AAPL").await.unwrap(), Some(dec("100")));
        assert_eq!(store.get_previous("AAPL").await, dec("100"));
        assert!(matches!(store.read("MSFT").await, Err(StoreError::InvalidPrice { raw, .. }) if raw == "garbage"));

        store.update("AAPL", dec("106")).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "ticker,price\nAAPL,106\nGOOG,140.5\n"
        );
    }

    #[tokio::test]
    async fn unreadable_store_falls_back_to_zero() {
        let dir = tempdir().unwrap();
        // a directory where the record file should be cannot be read or replaced
        let path = dir.path().join("prices.csv");
        std::fs::create_dir(&path).unwrap();
        let store = PriceStore::new(&path);

        assert!(matches!(store.read("AAPL").await, Err(StoreError::Io(_))));
        assert_eq!(store.get_previous("AAPL").await, Decimal::ZERO);
        assert!(store.update("AAPL", dec("1")).await.is_err());
        assert!(path.is_dir());
    }

    #[tokio::test]
    async fn open_creates_missing_file_and_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("prices.csv");

        PriceStore::open(&path).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "ticker,price\n");
    }

    #[tokio::test]
    async fn concurrent_updates_do_not_lose_tickers() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(PriceStore::new(dir.path().join("prices.csv")));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.update(&format!("T{i}"), Decimal::from(i)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.snapshot().await.unwrap().len(), 8);
    }
}
