pub mod aggregator;
pub mod analysis;
pub mod config;
pub mod context;
pub mod error;
pub mod models;
pub mod price_store;
pub mod report;
pub mod simulator;
pub mod trade_log;

pub mod commands {
    pub mod analyze;
}
