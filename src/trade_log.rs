use crate::error::{AnalyzerError, AnalyzerResult};
use crate::models::{parse_decimal, parse_timestamp, Direction, TradeRecord};
use anyhow::{anyhow, Result};
use log::{info, warn};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub trait TradeRecordSource {
    fn load(&self) -> AnalyzerResult<Vec<TradeRecord>>;
}

/// Which tickers of the trade log take part in a run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TickerFilter {
    #[default]
    All,
    Only(String),
    Exclude(String),
}

impl TickerFilter {
    pub fn allows(&self, ticker: &str) -> bool {
        match self {
            TickerFilter::All => true,
            TickerFilter::Only(selected) => ticker == selected,
            TickerFilter::Exclude(excluded) => ticker != excluded,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            TickerFilter::All => "all tickers".to_string(),
            TickerFilter::Only(ticker) => format!("only {}", ticker),
            TickerFilter::Exclude(ticker) => format!("all tickers except {}", ticker),
        }
    }

    pub fn apply(&self, trades: Vec<TradeRecord>) -> Vec<TradeRecord> {
        if matches!(self, TickerFilter::All) {
            return trades;
        }
        trades
            .into_iter()
            .filter(|trade| self.allows(&trade.ticker))
            .collect()
    }
}

/// Groups trades by ticker. Within a ticker the trade-log order is kept; the
/// map orders tickers lexicographically.
pub fn group_trades_by_ticker(trades: Vec<TradeRecord>) -> BTreeMap<String, Vec<TradeRecord>> {
    let mut grouped: BTreeMap<String, Vec<TradeRecord>> = BTreeMap::new();
    for trade in trades {
        grouped.entry(trade.ticker.clone()).or_default().push(trade);
    }
    grouped
}

#[derive(Debug, Deserialize)]
struct TradeRow {
    #[serde(rename = "Datetime")]
    datetime: String,
    #[serde(rename = "Ticker")]
    ticker: String,
    #[serde(rename = "Signal")]
    signal: String,
    #[serde(rename = "Entry")]
    entry: String,
    #[serde(rename = "StopLoss")]
    stop_loss: String,
    #[serde(rename = "TakeProfit")]
    take_profit: String,
}

impl TradeRow {
    fn into_record(self) -> Result<TradeRecord> {
        let ticker = self.ticker.trim().to_string();
        if ticker.is_empty() {
            return Err(anyhow!("empty ticker"));
        }
        Ok(TradeRecord {
            timestamp: parse_timestamp(&self.datetime)?,
            direction: self.signal.parse::<Direction>()?,
            entry: require_price("Entry", &self.entry)?,
            stop_loss: require_price("StopLoss", &self.stop_loss)?,
            take_profit: require_price("TakeProfit", &self.take_profit)?,
            ticker,
        })
    }
}

fn require_price(field: &str, raw: &str) -> Result<rust_decimal::Decimal> {
    parse_decimal(raw).ok_or_else(|| anyhow!("{} must be a number (value: {})", field, raw))
}

/// The `tradelog.csv` file appended to by the signal generator.
#[derive(Debug, Clone)]
pub struct CsvTradeLog {
    path: PathBuf,
}

impl CsvTradeLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unreadable(&self, source: csv::Error) -> AnalyzerError {
        AnalyzerError::TradeLogUnreadable {
            path: self.path.clone(),
            source,
        }
    }
}

impl TradeRecordSource for CsvTradeLog {
    fn load(&self) -> AnalyzerResult<Vec<TradeRecord>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(AnalyzerError::TradeLogMissing {
                    path: self.path.clone(),
                })
            }
            Err(err) => return Err(self.unreadable(csv::Error::from(err))),
        };

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(file);
        let mut trades = Vec::new();

        for (index, row) in reader.deserialize::<TradeRow>().enumerate() {
            let row = row.map_err(|err| self.unreadable(err))?;
            match row.into_record() {
                Ok(trade) => trades.push(trade),
                Err(err) => {
                    // Header is line 1.
                    warn!(
                        "Skipping trade log row {} in {}: {}",
                        index + 2,
                        self.path.display(),
                        err
                    );
                }
            }
        }

        info!(
            "Loaded {} trade(s) from {}",
            trades.len(),
            self.path.display()
        );
        Ok(trades)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::fs;

    const HEADER: &str = "Datetime,Ticker,Signal,Entry,StopLoss,TakeProfit";

    fn trade(ticker: &str, minute: u32) -> TradeRecord {
        TradeRecord {
            ticker: ticker.to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 6, 9, minute, 0).unwrap(),
            direction: Direction::Buy,
            entry: dec!(1),
            stop_loss: dec!(0.9),
            take_profit: dec!(1.2),
        }
    }

    #[test]
    fn loads_generator_rows_and_skips_bad_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tradelog.csv");
        fs::write(
            &path,
            format!(
                "{}\n2025-01-06 09:00:00,EURUSD=X,BUY,1.03000,1.02940,1.03080\n2025-01-06 09:05:00,GC=F,HOLD,2000,1990,2020\n2025-01-06 09:10:00,GC=F,SELL,2000.00000,2010.00000,1985.00000\n",
                HEADER
            ),
        )
        .unwrap();

        let trades = CsvTradeLog::new(&path).load().unwrap();

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].ticker, "EURUSD=X");
        assert_eq!(trades[0].stop_loss, dec!(1.0294));
        assert_eq!(trades[1].direction, Direction::Sell);
        assert_eq!(trades[1].take_profit, dec!(1985));
    }

    #[test]
    fn missing_trade_log_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = CsvTradeLog::new(dir.path().join("tradelog.csv"))
            .load()
            .unwrap_err();

        assert!(matches!(err, AnalyzerError::TradeLogMissing { .. }));
    }

    #[test]
    fn header_only_log_is_empty_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tradelog.csv");
        fs::write(&path, format!("{}\n", HEADER)).unwrap();

        assert!(CsvTradeLog::new(&path).load().unwrap().is_empty());
    }

    #[test]
    fn filters_select_or_exclude_one_ticker() {
        let trades = vec![trade("AAA", 0), trade("BBB", 5), trade("AAA", 10)];

        let only = TickerFilter::Only("AAA".to_string()).apply(trades.clone());
        let excluded = TickerFilter::Exclude("AAA".to_string()).apply(trades.clone());
        let all = TickerFilter::All.apply(trades);

        assert_eq!(only.len(), 2);
        assert!(only.iter().all(|t| t.ticker == "AAA"));
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].ticker, "BBB");
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn grouping_keeps_log_order_within_ticker() {
        let grouped =
            group_trades_by_ticker(vec![trade("BBB", 0), trade("AAA", 10), trade("AAA", 5)]);

        let tickers: Vec<_> = grouped.keys().cloned().collect();
        assert_eq!(tickers, vec!["AAA".to_string(), "BBB".to_string()]);
        let aaa = &grouped["AAA"];
        assert_eq!(aaa[0].timestamp.format("%M").to_string(), "10");
        assert_eq!(aaa[1].timestamp.format("%M").to_string(), "05");
    }
}
