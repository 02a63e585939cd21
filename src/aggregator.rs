use crate::models::{CostModel, OutcomeState, TradeOutcome};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Converts an outcome's price-unit PnL into currency with the ticker's cost
/// model. Unresolved outcomes are worth exactly zero; `None` means the
/// conversion overflowed.
pub fn price_outcome(outcome: &TradeOutcome, cost: &CostModel) -> Option<Decimal> {
    match outcome.state {
        OutcomeState::Win | OutcomeState::Loss | OutcomeState::Open => {
            cost.to_currency(outcome.pnl_price_units)
        }
        OutcomeState::Unresolved => Some(Decimal::ZERO),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub wins: u64,
    pub losses: u64,
    pub open_trades: u64,
    pub unresolved_trades: u64,
    pub closed_pnl_currency: Decimal,
    pub open_pnl_currency: Decimal,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub best_trade: Option<Decimal>,
    pub worst_trade: Option<Decimal>,
}

impl AggregateResult {
    pub fn closed_trades(&self) -> u64 {
        self.wins + self.losses
    }

    /// Percentage of closed trades that were wins; zero when nothing closed.
    pub fn win_rate(&self) -> Decimal {
        let closed = self.closed_trades();
        if closed == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.wins) * dec!(100) / Decimal::from(closed)
    }

    /// Closed PnL per losing trade, as a percentage. Zero without losses.
    pub fn roi(&self) -> Decimal {
        if self.losses == 0 {
            return Decimal::ZERO;
        }
        self.closed_pnl_currency
            .checked_div(Decimal::from(self.losses))
            .and_then(|per_loss| per_loss.checked_mul(dec!(100)))
            .unwrap_or(Decimal::ZERO)
    }

    pub fn profit_factor(&self) -> Option<Decimal> {
        if self.gross_loss.is_zero() {
            None
        } else {
            self.gross_profit.checked_div(self.gross_loss.abs())
        }
    }

    pub fn average_closed_pnl(&self) -> Decimal {
        let closed = self.closed_trades();
        if closed == 0 {
            Decimal::ZERO
        } else {
            self.closed_pnl_currency / Decimal::from(closed)
        }
    }

    pub fn metrics(&self) -> AggregateMetrics {
        AggregateMetrics {
            closed_trades: self.closed_trades(),
            win_rate: self.win_rate(),
            roi: self.roi(),
            profit_factor: self.profit_factor(),
            average_closed_pnl: self.average_closed_pnl(),
        }
    }
}

/// Ratios derived from an `AggregateResult`, for serialised reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateMetrics {
    pub closed_trades: u64,
    pub win_rate: Decimal,
    pub roi: Decimal,
    pub profit_factor: Option<Decimal>,
    pub average_closed_pnl: Decimal,
}

/// Running tally of priced outcomes.
///
/// Every field is a count, a sum or an extreme, so partial aggregators built
/// over disjoint slices can be merged in any order. Sums saturate at the
/// `Decimal` bounds rather than overflow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PnlAggregator {
    result: AggregateResult,
}

impl PnlAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: &TradeOutcome) {
        let pnl = outcome.pnl_currency;
        let result = &mut self.result;
        match outcome.state {
            OutcomeState::Win => {
                result.wins += 1;
                Self::record_closed(result, pnl);
            }
            OutcomeState::Loss => {
                result.losses += 1;
                Self::record_closed(result, pnl);
            }
            OutcomeState::Open => {
                result.open_trades += 1;
                result.open_pnl_currency = result.open_pnl_currency.saturating_add(pnl);
            }
            OutcomeState::Unresolved => {
                result.unresolved_trades += 1;
            }
        }
    }

    fn record_closed(result: &mut AggregateResult, pnl: Decimal) {
        result.closed_pnl_currency = result.closed_pnl_currency.saturating_add(pnl);
        if pnl > Decimal::ZERO {
            result.gross_profit = result.gross_profit.saturating_add(pnl);
        } else if pnl < Decimal::ZERO {
            result.gross_loss = result.gross_loss.saturating_add(pnl);
        }
        result.best_trade = Some(result.best_trade.map_or(pnl, |best| best.max(pnl)));
        result.worst_trade = Some(result.worst_trade.map_or(pnl, |worst| worst.min(pnl)));
    }

    pub fn merge(mut self, other: PnlAggregator) -> PnlAggregator {
        let result = &mut self.result;
        let other = other.result;
        result.wins += other.wins;
        result.losses += other.losses;
        result.open_trades += other.open_trades;
        result.unresolved_trades += other.unresolved_trades;
        result.closed_pnl_currency = result
            .closed_pnl_currency
            .saturating_add(other.closed_pnl_currency);
        result.open_pnl_currency = result
            .open_pnl_currency
            .saturating_add(other.open_pnl_currency);
        result.gross_profit = result.gross_profit.saturating_add(other.gross_profit);
        result.gross_loss = result.gross_loss.saturating_add(other.gross_loss);
        result.best_trade = merge_extreme(result.best_trade, other.best_trade, Decimal::max);
        result.worst_trade = merge_extreme(result.worst_trade, other.worst_trade, Decimal::min);
        self
    }

    pub fn result(&self) -> AggregateResult {
        self.result.clone()
    }

    pub fn from_outcomes<'a, I>(outcomes: I) -> PnlAggregator
    where
        I: IntoIterator<Item = &'a TradeOutcome>,
    {
        let mut aggregator = PnlAggregator::new();
        for outcome in outcomes {
            aggregator.record(outcome);
        }
        aggregator
    }
}

fn merge_extreme(
    left: Option<Decimal>,
    right: Option<Decimal>,
    pick: fn(Decimal, Decimal) -> Decimal,
) -> Option<Decimal> {
    match (left, right) {
        (Some(a), Some(b)) => Some(pick(a, b)),
        (Some(a), None) => Some(a),
        (None, b) => b,
    }
}
