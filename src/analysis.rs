use crate::aggregator::{price_outcome, AggregateMetrics, AggregateResult, PnlAggregator};
use crate::config::CostModelSource;
use crate::models::{Candle, CostModel, TradeOutcome, TradeRecord, UnresolvedReason};
use crate::price_store::PriceSeriesStore;
use crate::simulator::simulate_trade;
use crate::trade_log::group_trades_by_ticker;
use chrono::{DateTime, Utc};
use log::{info, warn};
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Instant;

/// Non-fatal conditions found while analyzing, kept for the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// No price series; the ticker's trades were skipped.
    MissingPriceData {
        ticker: String,
        trades: usize,
        reason: String,
    },
    EmptyPriceData {
        ticker: String,
        trades: usize,
    },
    MissingCostModel {
        ticker: String,
    },
    IncompleteCostModel {
        ticker: String,
        lot_size: Decimal,
        point_value: Decimal,
    },
    UnmatchedEntry {
        ticker: String,
        timestamp: DateTime<Utc>,
    },
    /// Currency conversion overflowed; the trade was priced at zero.
    CurrencyOverflow {
        ticker: String,
        timestamp: DateTime<Utc>,
    },
}

impl Diagnostic {
    pub fn message(&self) -> String {
        match self {
            Diagnostic::MissingPriceData {
                ticker,
                trades,
                reason,
            } => format!(
                "Price data for {} unavailable ({}); skipped {} trade(s)",
                ticker, reason, trades
            ),
            Diagnostic::EmptyPriceData { ticker, trades } => format!(
                "Price data for {} is empty; {} trade(s) unresolved",
                ticker, trades
            ),
            Diagnostic::MissingCostModel { ticker } => format!(
                "No cost model for {}; spread is 0 and currency PnL will be 0",
                ticker
            ),
            Diagnostic::IncompleteCostModel {
                ticker,
                lot_size,
                point_value,
            } => format!(
                "Incomplete cost model for {} (lot size {}, point value {}); currency PnL will be 0",
                ticker, lot_size, point_value
            ),
            Diagnostic::UnmatchedEntry { ticker, timestamp } => format!(
                "Could not find entry candle for {} trade at {}",
                ticker,
                timestamp.format("%Y-%m-%d %H:%M:%S")
            ),
            Diagnostic::CurrencyOverflow { ticker, timestamp } => format!(
                "Currency PnL for {} trade at {} is out of range; recorded as 0",
                ticker,
                timestamp.format("%Y-%m-%d %H:%M:%S")
            ),
        }
    }
}

/// Looks up a ticker's cost model, falling back to an all-zero model when the
/// entry is missing. Both the fallback and unusable sizing are reported.
pub fn resolve_cost_model<C: CostModelSource + ?Sized>(
    costs: &C,
    ticker: &str,
) -> (CostModel, Option<Diagnostic>) {
    match costs.get_cost_model(ticker) {
        None => (
            CostModel::default(),
            Some(Diagnostic::MissingCostModel {
                ticker: ticker.to_string(),
            }),
        ),
        Some(model) if !model.is_sized() => (
            model,
            Some(Diagnostic::IncompleteCostModel {
                ticker: ticker.to_string(),
                lot_size: model.lot_size,
                point_value: model.point_value,
            }),
        ),
        Some(model) => (model, None),
    }
}

/// Per-ticker slice of a run.
#[derive(Debug, Clone, Serialize)]
pub struct TickerAnalysis {
    pub ticker: String,
    /// `None` when the ticker was skipped for lack of price data.
    pub cost_model: Option<CostModel>,
    pub candles: usize,
    pub last_candle: Option<DateTime<Utc>>,
    pub outcomes: Vec<TradeOutcome>,
    pub summary: AggregateResult,
    pub diagnostics: Vec<Diagnostic>,
}

impl TickerAnalysis {
    pub fn skipped(&self) -> bool {
        self.cost_model.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub total_trades: usize,
    pub tickers: Vec<TickerAnalysis>,
    pub aggregate: AggregateResult,
    pub metrics: AggregateMetrics,
}

impl AnalysisReport {
    pub fn outcomes(&self) -> impl Iterator<Item = &TradeOutcome> {
        self.tickers.iter().flat_map(|ticker| ticker.outcomes.iter())
    }

    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.tickers.iter().flat_map(|ticker| ticker.diagnostics.iter())
    }

    pub fn skipped_tickers(&self) -> Vec<&str> {
        self.tickers
            .iter()
            .filter(|ticker| ticker.skipped())
            .map(|ticker| ticker.ticker.as_str())
            .collect()
    }
}

/// Runs the simulator and aggregator over a trade log.
pub struct Analyzer<'a, P: PriceSeriesStore + ?Sized, C: CostModelSource + ?Sized> {
    prices: &'a P,
    costs: &'a C,
}

impl<'a, P: PriceSeriesStore + ?Sized, C: CostModelSource + ?Sized> Analyzer<'a, P, C> {
    pub fn new(prices: &'a P, costs: &'a C) -> Self {
        Self { prices, costs }
    }

    pub fn analyze(&self, trades: Vec<TradeRecord>) -> AnalysisReport {
        let started = Instant::now();
        let total_trades = trades.len();
        let grouped: Vec<(String, Vec<TradeRecord>)> =
            group_trades_by_ticker(trades).into_iter().collect();
        info!(
            "Analyzing {} trade(s) across {} ticker(s)",
            total_trades,
            grouped.len()
        );

        let tickers: Vec<TickerAnalysis> = grouped
            .into_par_iter()
            .map(|(ticker, trades)| self.analyze_ticker(ticker, trades))
            .collect();

        let aggregate = tickers
            .par_iter()
            .flat_map(|ticker| ticker.outcomes.par_iter())
            .fold(PnlAggregator::new, |mut aggregator, outcome| {
                aggregator.record(outcome);
                aggregator
            })
            .reduce(PnlAggregator::new, PnlAggregator::merge)
            .result();

        info!(
            "Analysis finished in {:.2}s: {} closed, {} open, {} unresolved",
            started.elapsed().as_secs_f64(),
            aggregate.closed_trades(),
            aggregate.open_trades,
            aggregate.unresolved_trades
        );

        AnalysisReport {
            generated_at: Utc::now(),
            total_trades,
            tickers,
            metrics: aggregate.metrics(),
            aggregate,
        }
    }

    fn analyze_ticker(&self, ticker: String, trades: Vec<TradeRecord>) -> TickerAnalysis {
        let mut diagnostics = Vec::new();

        let series = match self.prices.get_series(&ticker) {
            Ok(Some(series)) => series,
            Ok(None) => {
                return Self::skip_ticker(ticker, trades.len(), "no price series found");
            }
            Err(err) => {
                return Self::skip_ticker(ticker, trades.len(), &err.to_string());
            }
        };

        let (cost_model, cost_diagnostic) = resolve_cost_model(self.costs, &ticker);
        if let Some(diagnostic) = cost_diagnostic {
            warn!("{}", diagnostic.message());
            diagnostics.push(diagnostic);
        } else {
            info!(
                "{}: spread {}, lot size {}, point value {}",
                ticker, cost_model.spread, cost_model.lot_size, cost_model.point_value
            );
        }

        if series.is_empty() {
            let diagnostic = Diagnostic::EmptyPriceData {
                ticker: ticker.clone(),
                trades: trades.len(),
            };
            warn!("{}", diagnostic.message());
            diagnostics.push(diagnostic);
        }

        let (outcomes, trade_diagnostics) = simulate_ticker(&trades, &series, &cost_model);
        for diagnostic in trade_diagnostics {
            warn!("{}", diagnostic.message());
            diagnostics.push(diagnostic);
        }

        let summary = PnlAggregator::from_outcomes(&outcomes).result();
        TickerAnalysis {
            candles: series.len(),
            last_candle: series.last().map(|candle| candle.timestamp),
            cost_model: Some(cost_model),
            ticker,
            outcomes,
            summary,
            diagnostics,
        }
    }

    fn skip_ticker(ticker: String, trades: usize, reason: &str) -> TickerAnalysis {
        let diagnostic = Diagnostic::MissingPriceData {
            ticker: ticker.clone(),
            trades,
            reason: reason.to_string(),
        };
        warn!("{}", diagnostic.message());
        TickerAnalysis {
            ticker,
            cost_model: None,
            candles: 0,
            last_candle: None,
            outcomes: Vec::new(),
            summary: AggregateResult::default(),
            diagnostics: vec![diagnostic],
        }
    }
}

/// Simulates and prices every trade of one ticker, in trade-log order,
/// along with the per-trade diagnostics.
pub fn simulate_ticker(
    trades: &[TradeRecord],
    candles: &[Candle],
    cost_model: &CostModel,
) -> (Vec<TradeOutcome>, Vec<Diagnostic>) {
    let mut outcomes = Vec::with_capacity(trades.len());
    let mut diagnostics = Vec::new();

    for trade in trades {
        let mut outcome = simulate_trade(trade, candles, cost_model.spread);
        if outcome.unresolved_reason == Some(UnresolvedReason::NoEntryCandle) {
            diagnostics.push(Diagnostic::UnmatchedEntry {
                ticker: trade.ticker.clone(),
                timestamp: trade.timestamp,
            });
        }
        match price_outcome(&outcome, cost_model) {
            Some(pnl) => outcome.pnl_currency = pnl,
            None => {
                outcome.pnl_currency = Decimal::ZERO;
                diagnostics.push(Diagnostic::CurrencyOverflow {
                    ticker: trade.ticker.clone(),
                    timestamp: trade.timestamp,
                });
            }
        }
        outcomes.push(outcome);
    }

    (outcomes, diagnostics)
}
