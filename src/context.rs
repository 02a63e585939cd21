use crate::config::{AnalyzerSettings, CostModelTable};
use crate::price_store::CsvPriceStore;
use crate::trade_log::CsvTradeLog;
use anyhow::{Context, Result};
use log::info;

/// Resolved settings plus constructors for the file-backed sources.
#[derive(Clone, Debug)]
pub struct AppContext {
    settings: AnalyzerSettings,
}

impl AppContext {
    pub fn initialize(settings: AnalyzerSettings) -> Self {
        info!(
            "Trade log: {}, cost config: {}, price data: {}",
            settings.trade_log.display(),
            settings.cost_config.display(),
            settings.data_dir.display()
        );
        Self { settings }
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    pub fn trade_log(&self) -> CsvTradeLog {
        CsvTradeLog::new(&self.settings.trade_log)
    }

    pub fn price_store(&self) -> CsvPriceStore {
        CsvPriceStore::new(&self.settings.data_dir)
    }

    pub fn cost_models(&self) -> Result<CostModelTable> {
        CostModelTable::load(&self.settings.cost_config).with_context(|| {
            format!(
                "Failed to load cost models from {}",
                self.settings.cost_config.display()
            )
        })
    }
}
