use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("Trade log file '{}' not found", path.display())]
    TradeLogMissing { path: PathBuf },

    #[error("Failed to read trade log '{}': {source}", path.display())]
    TradeLogUnreadable {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to open '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read price data '{}': {source}", path.display())]
    PriceDataUnreadable {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to render report: {0}")]
    Render(#[from] serde_json::Error),
}

pub type AnalyzerResult<T> = Result<T, AnalyzerError>;
