use crate::models::{parse_decimal, CostModel};
use anyhow::{anyhow, Result};
use log::{info, warn};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const DEFAULT_TRADE_LOG_FILE: &str = "tradelog.csv";
pub const DEFAULT_COST_CONFIG_FILE: &str = "analyze_conf.txt";
pub const DEFAULT_DATA_DIR: &str = ".";

pub const TRADE_LOG_ENV: &str = "ANALYZER_TRADE_LOG";
pub const COST_CONFIG_ENV: &str = "ANALYZER_COST_CONFIG";
pub const DATA_DIR_ENV: &str = "ANALYZER_DATA_DIR";

/// Point values used by the three-column config format, per standard lot.
const JPY_POINT_VALUE: Decimal = dec!(1000);
const DEFAULT_POINT_VALUE: Decimal = dec!(100000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    /// One line per trade and the summary, without per-ticker sections.
    Brief,
    Json,
}

/// File locations and output choices for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub trade_log: PathBuf,
    pub cost_config: PathBuf,
    pub data_dir: PathBuf,
    pub format: ReportFormat,
    pub output: Option<PathBuf>,
}

impl AnalyzerSettings {
    /// Resolves each path from the CLI value, then the environment, then the
    /// default file name in the working directory.
    pub fn resolve(
        trade_log: Option<PathBuf>,
        cost_config: Option<PathBuf>,
        data_dir: Option<PathBuf>,
        format: ReportFormat,
        output: Option<PathBuf>,
    ) -> Self {
        Self {
            trade_log: resolve_path(trade_log, TRADE_LOG_ENV, DEFAULT_TRADE_LOG_FILE),
            cost_config: resolve_path(cost_config, COST_CONFIG_ENV, DEFAULT_COST_CONFIG_FILE),
            data_dir: resolve_path(data_dir, DATA_DIR_ENV, DEFAULT_DATA_DIR),
            format,
            output,
        }
    }
}

fn resolve_path(cli_value: Option<PathBuf>, env_key: &str, default: &str) -> PathBuf {
    if let Some(path) = cli_value {
        return path;
    }

    match env::var(env_key) {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value.trim()),
        _ => PathBuf::from(default),
    }
}

/// Looks up a ticker's cost model. `None` means the ticker has no entry, which
/// is distinct from an entry whose values are zero.
pub trait CostModelSource: Send + Sync {
    fn get_cost_model(&self, ticker: &str) -> Option<CostModel>;
}

#[derive(Debug, Clone, Default)]
pub struct CostModelTable {
    entries: HashMap<String, CostModel>,
}

impl CostModelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: Into<String>>(&mut self, ticker: S, model: CostModel) {
        self.entries.insert(ticker.into(), model);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reads the analysis config file. A missing file yields an empty table.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let table = Self::parse(&contents);
                info!(
                    "Loaded cost models for {} ticker(s) from {}",
                    table.len(),
                    path.display()
                );
                Ok(table)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(
                    "Analysis config file '{}' not found. Currency PnL will be 0 for every ticker.",
                    path.display()
                );
                Ok(Self::new())
            }
            Err(err) => Err(anyhow!(
                "Failed to read analysis config '{}': {}",
                path.display(),
                err
            )),
        }
    }

    /// Parses `TICKER SPREAD LOT_SIZE POINT_VALUE` lines. The older
    /// `TICKER SPREAD LOT_SIZE` form derives the point value from the symbol.
    pub fn parse(contents: &str) -> Self {
        let mut table = Self::new();

        for (line_index, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match parse_cost_line(line) {
                Ok((ticker, model)) => {
                    if table.entries.contains_key(&ticker) {
                        warn!(
                            "Duplicate cost model for {} on line {}; later entry wins",
                            ticker,
                            line_index + 1
                        );
                    }
                    table.insert(ticker, model);
                }
                Err(err) => {
                    warn!("Skipping analysis config line {}: {}", line_index + 1, err);
                }
            }
        }

        table
    }
}

impl CostModelSource for CostModelTable {
    fn get_cost_model(&self, ticker: &str) -> Option<CostModel> {
        self.entries.get(ticker).copied()
    }
}

fn parse_cost_line(line: &str) -> Result<(String, CostModel)> {
    let (ticker, model) = parse_cost_columns(line)?;
    if model.to_currency(Decimal::ONE).is_none() {
        return Err(anyhow!(
            "lot size x point value for {} is out of range (value: {})",
            ticker,
            line
        ));
    }
    Ok((ticker, model))
}

fn parse_cost_columns(line: &str) -> Result<(String, CostModel)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        [ticker, spread, lot_size, point_value] => {
            let model = CostModel::new(
                require_non_negative(ticker, "spread", spread)?,
                require_non_negative(ticker, "lot size", lot_size)?,
                require_non_negative(ticker, "point value", point_value)?,
            );
            Ok((ticker.to_string(), model))
        }
        [ticker, spread, lot_size] => {
            let model = CostModel::new(
                require_non_negative(ticker, "spread", spread)?,
                require_non_negative(ticker, "lot size", lot_size)?,
                legacy_point_value(ticker),
            );
            Ok((ticker.to_string(), model))
        }
        _ => Err(anyhow!(
            "expected 'TICKER SPREAD LOT_SIZE POINT_VALUE' (value: {})",
            line
        )),
    }
}

fn require_non_negative(ticker: &str, key: &str, raw: &str) -> Result<Decimal> {
    let value = parse_decimal(raw)
        .ok_or_else(|| anyhow!("{} for {} must be a number (value: {})", key, ticker, raw))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(anyhow!(
            "{} for {} must be >= 0 (value: {})",
            key,
            ticker,
            raw
        ));
    }
    Ok(value)
}

/// Currency value of one price unit for a standard lot, approximated from the
/// quote currency.
pub fn legacy_point_value(ticker: &str) -> Decimal {
    if ticker.to_uppercase().contains("JPY") {
        JPY_POINT_VALUE
    } else {
        DEFAULT_POINT_VALUE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_four_column_entries_and_skips_comments() {
        let table = CostModelTable::parse(
            "# ticker spread lot point\n\nEURUSD=X 0.0002 0.1 100000\n  GC=F 0.5 1 100  \n",
        );

        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get_cost_model("EURUSD=X"),
            Some(CostModel::new(dec!(0.0002), dec!(0.1), dec!(100000)))
        );
        assert_eq!(
            table.get_cost_model("GC=F"),
            Some(CostModel::new(dec!(0.5), dec!(1), dec!(100)))
        );
        assert_eq!(table.get_cost_model("BTC-USD"), None);
    }

    #[test]
    fn three_column_entries_derive_point_value() {
        let table = CostModelTable::parse("JPY=X 0.02 0.1\nGBPUSD=X 0.0003 0.1\n");

        assert_eq!(
            table.get_cost_model("JPY=X").map(|m| m.point_value),
            Some(dec!(1000))
        );
        assert_eq!(
            table.get_cost_model("GBPUSD=X").map(|m| m.point_value),
            Some(dec!(100000))
        );
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let table = CostModelTable::parse(
            "AAA 0.1 1 abc\nBBB 0.1\nCCC -0.1 1 1\nDDD 0.1 1 1 extra\nEEE 0 0 0\n",
        );

        assert_eq!(table.len(), 1);
        let zero = table.get_cost_model("EEE").expect("EEE entry missing");
        assert!(!zero.is_sized());
    }

    #[test]
    fn missing_config_file_yields_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let table = CostModelTable::load(&dir.path().join("absent.txt")).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn cli_value_wins_over_default() {
        let settings = AnalyzerSettings::resolve(
            Some(PathBuf::from("/tmp/custom-log.csv")),
            None,
            None,
            ReportFormat::Json,
            None,
        );
        assert_eq!(settings.trade_log, PathBuf::from("/tmp/custom-log.csv"));
        assert_eq!(settings.format, ReportFormat::Json);
    }

    #[test]
    fn out_of_range_sizing_is_rejected() {
        let table = CostModelTable::parse(
            "HUGE=X 0 1000000 10000000000000000000000000
GC=F 0.5 1 100
",
        );

        assert_eq!(table.get_cost_model("HUGE=X"), None);
        assert!(table.get_cost_model("GC=F").is_some());
    }
}
