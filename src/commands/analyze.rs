use crate::analysis::{AnalysisReport, Analyzer};
use crate::config::ReportFormat;
use crate::context::AppContext;
use crate::report::{format_report, render_json, render_text, EMPTY_TRADE_LOG_MESSAGE};
use crate::trade_log::{TickerFilter, TradeRecordSource};
use anyhow::{Context, Result};
use log::info;
use std::io::Write;

/// Loads the trade log, evaluates every selected trade and writes the report.
///
/// Returns `Ok(None)` when no trades remain after filtering.
pub fn run(
    app: &AppContext,
    filter: &TickerFilter,
    out: &mut dyn Write,
) -> Result<Option<AnalysisReport>> {
    let trade_log = app.trade_log();
    let trades = trade_log.load()?;
    let loaded = trades.len();
    let trades = filter.apply(trades);
    info!(
        "Selected {} of {} trade(s) from {} ({})",
        trades.len(),
        loaded,
        trade_log.path().display(),
        filter.describe()
    );

    if trades.is_empty() {
        writeln!(out, "{}", EMPTY_TRADE_LOG_MESSAGE).context("Failed to write report")?;
        return Ok(None);
    }

    let costs = app.cost_models()?;
    let prices = app.price_store();
    let report = Analyzer::new(&prices, &costs).analyze(trades);

    let rendered = match app.settings().format {
        ReportFormat::Text => render_text(&report),
        ReportFormat::Brief => {
            let outcomes: Vec<_> = report.outcomes().cloned().collect();
            format_report(&outcomes, &report.aggregate)
        }
        ReportFormat::Json => render_json(&report)?,
    };
    out.write_all(rendered.as_bytes())
        .context("Failed to write report")?;
    if !rendered.ends_with('\n') {
        writeln!(out).context("Failed to write report")?;
    }
    out.flush().context("Failed to write report")?;

    Ok(Some(report))
}
