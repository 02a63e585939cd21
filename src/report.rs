use crate::aggregator::AggregateResult;
use crate::analysis::{AnalysisReport, TickerAnalysis};
use crate::error::AnalyzerResult;
use crate::models::{OutcomeState, TradeOutcome};
use rust_decimal::{Decimal, RoundingStrategy};

pub const EMPTY_TRADE_LOG_MESSAGE: &str =
    "Trade log is empty or was filtered to be empty. No trades to analyze.";

const SUMMARY_HEADER: &str = "--- PERFORMANCE SUMMARY ---";
const SUMMARY_RULE: &str = "---------------------------";
const SUMMARY_FOOTER: &str = "===========================";

/// Two-decimal currency, rounding half away from zero.
pub fn format_money(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("${:.2}", rounded)
}

pub fn format_percent(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.2}%", rounded)
}

/// One line per trade followed by the performance summary.
pub fn format_report(outcomes: &[TradeOutcome], aggregate: &AggregateResult) -> String {
    let mut out = String::new();
    for outcome in outcomes {
        out.push_str(&format!("{} {}\n", outcome.trade.ticker, trade_line(outcome)));
    }
    if !outcomes.is_empty() {
        out.push('\n');
    }
    out.push_str(&format_summary(aggregate));
    out
}

fn trade_line(outcome: &TradeOutcome) -> String {
    let head = format!(
        "Trade at {}: {} -> {}",
        outcome.trade.timestamp.format("%Y-%m-%d %H:%M"),
        outcome.trade.direction,
        outcome.state
    );
    match outcome.state {
        OutcomeState::Win | OutcomeState::Loss => {
            format!("{} | Final PnL: {}", head, format_money(outcome.pnl_currency))
        }
        OutcomeState::Open => {
            format!("{} | Current PnL: {}", head, format_money(outcome.pnl_currency))
        }
        OutcomeState::Unresolved => {
            let reason = outcome
                .unresolved_reason
                .map(|reason| reason.describe())
                .unwrap_or("not evaluated");
            format!("{} | {}", head, reason)
        }
    }
}

pub fn format_summary(aggregate: &AggregateResult) -> String {
    let mut out = String::new();
    out.push_str(SUMMARY_HEADER);
    out.push('\n');
    out.push_str(&format!("Total Closed Trades: {}\n", aggregate.closed_trades()));
    out.push_str(&format!("Winning Trades: {}\n", aggregate.wins));
    out.push_str(&format!("Losing Trades: {}\n", aggregate.losses));
    out.push_str(&format!("Win Rate: {}\n", format_percent(aggregate.win_rate())));
    out.push_str(&format!(
        "Closed Trades PnL: {}\n",
        format_money(aggregate.closed_pnl_currency)
    ));
    out.push_str(&format!(
        "ROI (based on losses): {}\n",
        format_percent(aggregate.roi())
    ));
    out.push_str(SUMMARY_RULE);
    out.push('\n');
    out.push_str(&format!(
        "Unclosed Orders P/L: {} ({} open)\n",
        format_money(aggregate.open_pnl_currency),
        aggregate.open_trades
    ));
    out.push_str(SUMMARY_FOOTER);
    out.push('\n');
    out
}

fn format_extended(aggregate: &AggregateResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("Unresolved Trades: {}\n", aggregate.unresolved_trades));
    out.push_str(&format!(
        "Gross Profit: {}\n",
        format_money(aggregate.gross_profit)
    ));
    out.push_str(&format!("Gross Loss: {}\n", format_money(aggregate.gross_loss)));
    out.push_str(&format!(
        "Average Closed PnL: {}\n",
        format_money(aggregate.average_closed_pnl())
    ));
    let profit_factor = aggregate
        .profit_factor()
        .map(|value| format!("{:.2}", value.round_dp(2)))
        .unwrap_or_else(|| "n/a".to_string());
    out.push_str(&format!("Profit Factor: {}\n", profit_factor));
    if let (Some(best), Some(worst)) = (aggregate.best_trade, aggregate.worst_trade) {
        out.push_str(&format!("Best Trade: {}\n", format_money(best)));
        out.push_str(&format!("Worst Trade: {}\n", format_money(worst)));
    }
    out
}

fn format_ticker(ticker: &TickerAnalysis) -> String {
    let mut out = format!("Analyzing trades for {}...\n", ticker.ticker);

    if let Some(cost_model) = ticker.cost_model {
        out.push_str(&format!(
            "  - Using Spread: {}, Lot Size: {}, Point Value: {}\n",
            cost_model.spread, cost_model.lot_size, cost_model.point_value
        ));
    }
    for diagnostic in &ticker.diagnostics {
        out.push_str(&format!("  - Warning: {}\n", diagnostic.message()));
    }
    if ticker.skipped() {
        return out;
    }

    for outcome in &ticker.outcomes {
        out.push_str(&format!("  - {}\n", trade_line(outcome)));
    }
    let summary = &ticker.summary;
    out.push_str(&format!(
        "  = {}: {}W / {}L, closed {}, open {}\n",
        ticker.ticker,
        summary.wins,
        summary.losses,
        format_money(summary.closed_pnl_currency),
        format_money(summary.open_pnl_currency)
    ));
    out
}

/// Full text report: per-ticker sections, the summary and extended figures.
pub fn render_text(report: &AnalysisReport) -> String {
    let mut out = String::new();
    for ticker in &report.tickers {
        out.push_str(&format_ticker(ticker));
        out.push('\n');
    }

    out.push_str(&format_summary(&report.aggregate));
    out.push_str(&format_extended(&report.aggregate));

    let skipped = report.skipped_tickers();
    if !skipped.is_empty() {
        out.push_str(&format!("Skipped Tickers: {}\n", skipped.join(", ")));
    }
    out
}

pub fn render_json(report: &AnalysisReport) -> AnalyzerResult<String> {
    Ok(serde_json::to_string_pretty(report)?)
}
