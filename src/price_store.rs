use crate::error::{AnalyzerError, AnalyzerResult};
use crate::models::{parse_decimal, parse_timestamp, Candle};
use log::{debug, warn};
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read access to per-ticker candle history.
///
/// `Ok(None)` means the store has no data for the ticker at all;
/// `Ok(Some(series))` may still be empty.
pub trait PriceSeriesStore: Send + Sync {
    fn get_series(&self, ticker: &str) -> AnalyzerResult<Option<Arc<Vec<Candle>>>>;
}

#[derive(Debug, Deserialize)]
struct CandleRow {
    #[serde(rename = "Datetime", alias = "datetime", alias = "timestamp", alias = "Date")]
    datetime: String,
    #[serde(rename = "Open", alias = "open")]
    open: String,
    #[serde(rename = "High", alias = "high")]
    high: String,
    #[serde(rename = "Low", alias = "low")]
    low: String,
    #[serde(rename = "Close", alias = "close")]
    close: String,
    #[serde(rename = "Volume", alias = "volume", default)]
    volume: Option<String>,
}

impl CandleRow {
    fn into_candle(self) -> Option<Candle> {
        let timestamp = parse_timestamp(&self.datetime).ok()?;
        Some(Candle {
            timestamp,
            open: parse_decimal(&self.open)?,
            high: parse_decimal(&self.high)?,
            low: parse_decimal(&self.low)?,
            close: parse_decimal(&self.close)?,
            volume: self.volume.as_deref().map(parse_volume).unwrap_or(0),
        })
    }
}

fn parse_volume(raw: &str) -> u64 {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<u64>() {
        return value;
    }
    parse_decimal(trimmed)
        .filter(|value| !value.is_sign_negative())
        .and_then(|value| value.trunc().to_u64())
        .unwrap_or(0)
}

/// Sorts candles by timestamp and collapses duplicate timestamps, keeping the
/// row read last.
pub fn normalize_series(ticker: &str, mut candles: Vec<Candle>) -> Vec<Candle> {
    let already_sorted = candles
        .windows(2)
        .all(|pair| pair[0].timestamp < pair[1].timestamp);
    if already_sorted {
        return candles;
    }

    let before = candles.len();
    // Stable sort keeps file order among equal timestamps.
    candles.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    let mut normalized: Vec<Candle> = Vec::with_capacity(candles.len());
    for candle in candles {
        match normalized.last_mut() {
            Some(last) if last.timestamp == candle.timestamp => *last = candle,
            _ => normalized.push(candle),
        }
    }

    warn!(
        "Price series for {} was out of order or had duplicate timestamps; {} row(s) kept of {}",
        ticker,
        normalized.len(),
        before
    );
    normalized
}

/// Reads `<data_dir>/<TICKER>.csv` files as written by the data fetcher.
#[derive(Debug, Clone)]
pub struct CsvPriceStore {
    data_dir: PathBuf,
}

impl CsvPriceStore {
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn series_path(&self, ticker: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv", ticker))
    }

    fn read_series(&self, path: &Path, ticker: &str) -> AnalyzerResult<Option<Vec<Candle>>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(AnalyzerError::Io {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        };

        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
        let mut candles = Vec::new();
        let mut skipped = 0usize;

        for row in reader.deserialize::<CandleRow>() {
            let row = row.map_err(|err| AnalyzerError::PriceDataUnreadable {
                path: path.to_path_buf(),
                source: err,
            })?;
            match row.into_candle() {
                Some(candle) => candles.push(candle),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!(
                "Skipped {} malformed candle row(s) in {}",
                skipped,
                path.display()
            );
        }
        debug!("Read {} candle(s) for {}", candles.len(), ticker);

        Ok(Some(normalize_series(ticker, candles)))
    }
}

impl PriceSeriesStore for CsvPriceStore {
    fn get_series(&self, ticker: &str) -> AnalyzerResult<Option<Arc<Vec<Candle>>>> {
        let path = self.series_path(ticker);
        Ok(self.read_series(&path, ticker)?.map(Arc::new))
    }
}

/// Candle series held in memory, keyed by ticker.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPriceStore {
    series: HashMap<String, Arc<Vec<Candle>>>,
}

impl InMemoryPriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: Into<String>>(&mut self, ticker: S, candles: Vec<Candle>) {
        let ticker = ticker.into();
        let normalized = normalize_series(&ticker, candles);
        self.series.insert(ticker, Arc::new(normalized));
    }

    pub fn with_series<S: Into<String>>(mut self, ticker: S, candles: Vec<Candle>) -> Self {
        self.insert(ticker, candles);
        self
    }
}

impl PriceSeriesStore for InMemoryPriceStore {
    fn get_series(&self, ticker: &str) -> AnalyzerResult<Option<Arc<Vec<Candle>>>> {
        Ok(self.series.get(ticker).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::fs;

    const FETCHER_HEADER: &str = "Datetime,Open,High,Low,Close,Adj Close,Volume,ATR";

    #[test]
    fn reads_fetcher_csv_and_ignores_extra_columns() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("EURUSD=X.csv"),
            format!(
                "{}\n2025-01-06 09:00:00,1.030000,1.031000,1.029000,1.030500,1.030500,0,0.000400\n2025-01-06 09:05:00,1.030500,1.032000,1.030100,1.031800,1.031800,12,0.000410\n",
                FETCHER_HEADER
            ),
        )
        .unwrap();

        let store = CsvPriceStore::new(dir.path());
        let series = store.get_series("EURUSD=X").unwrap().expect("series");

        assert_eq!(series.len(), 2);
        assert_eq!(
            series[0].timestamp,
            Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap()
        );
        assert_eq!(series[1].close, dec!(1.0318));
        assert_eq!(series[1].volume, 12);
    }

    #[test]
    fn missing_file_is_none_and_header_only_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("GC=F.csv"), format!("{}\n", FETCHER_HEADER)).unwrap();
        let store = CsvPriceStore::new(dir.path());

        assert!(store.get_series("SI=F").unwrap().is_none());
        let empty = store.get_series("GC=F").unwrap().expect("series");
        assert!(empty.is_empty());
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("AAA.csv"),
            "Datetime,Open,High,Low,Close,Volume\nnot-a-date,1,2,0.5,1.5,10\n2025-01-06 09:00:00,1,2,0.5,,10\n2025-01-06 09:05:00,1,2,0.5,1.5,10.0\n",
        )
        .unwrap();

        let series = CsvPriceStore::new(dir.path())
            .get_series("AAA")
            .unwrap()
            .expect("series");

        assert_eq!(series.len(), 1);
        assert_eq!(series[0].volume, 10);
    }

    #[test]
    fn normalization_sorts_and_keeps_last_duplicate() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2025, 1, 6, 9, 5, 0).unwrap();
        let candle = |timestamp, close| Candle {
            timestamp,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0,
        };

        let normalized = normalize_series(
            "AAA",
            vec![candle(t1, dec!(2)), candle(t0, dec!(1)), candle(t1, dec!(3))],
        );

        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0].timestamp, t0);
        assert_eq!(normalized[1].close, dec!(3));
    }
}
