use anyhow::{anyhow, Result as AnyResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }

    /// Price-unit gain of moving from `entry` to `exit` in this direction.
    pub fn price_move(&self, entry: Decimal, exit: Decimal) -> Decimal {
        match self {
            Direction::Buy => exit - entry,
            Direction::Sell => entry - exit,
        }
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(Direction::Buy),
            "sell" => Ok(Direction::Sell),
            other => Err(anyhow!("Unknown trade direction '{}'", other)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

/// Per-ticker trading costs and position sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CostModel {
    /// Charged once per trade, in price units.
    pub spread: Decimal,
    pub lot_size: Decimal,
    /// Currency per price unit per unit lot.
    pub point_value: Decimal,
}

impl CostModel {
    pub fn new(spread: Decimal, lot_size: Decimal, point_value: Decimal) -> Self {
        Self {
            spread,
            lot_size,
            point_value,
        }
    }

    /// A model with zero lot size or point value turns every result into 0.
    pub fn is_sized(&self) -> bool {
        !self.lot_size.is_zero() && !self.point_value.is_zero()
    }

    /// `None` when the product does not fit in a `Decimal`.
    pub fn to_currency(&self, pnl_price_units: Decimal) -> Option<Decimal> {
        pnl_price_units
            .checked_mul(self.lot_size)?
            .checked_mul(self.point_value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeState {
    Win,
    Loss,
    Open,
    Unresolved,
}

impl OutcomeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeState::Win => "WIN",
            OutcomeState::Loss => "LOSS",
            OutcomeState::Open => "OPEN",
            OutcomeState::Unresolved => "UNRESOLVED",
        }
    }
}

impl fmt::Display for OutcomeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// The series has candles, none at the trade timestamp.
    NoEntryCandle,
    EmptySeries,
}

impl UnresolvedReason {
    pub fn describe(&self) -> &'static str {
        match self {
            UnresolvedReason::NoEntryCandle => "no candle at entry timestamp",
            UnresolvedReason::EmptySeries => "price series is empty",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub trade: TradeRecord,
    pub state: OutcomeState,
    /// Net of spread for WIN/LOSS/OPEN, exactly zero for UNRESOLVED.
    pub pnl_price_units: Decimal,
    pub pnl_currency: Decimal,
    /// Stop or target level for closed trades, the marking close for OPEN.
    pub exit_price: Option<Decimal>,
    pub exit_time: Option<DateTime<Utc>>,
    pub candles_held: usize,
    pub unresolved_reason: Option<UnresolvedReason>,
}

impl TradeOutcome {
    pub fn unresolved(trade: TradeRecord, reason: UnresolvedReason) -> Self {
        Self {
            trade,
            state: OutcomeState::Unresolved,
            pnl_price_units: Decimal::ZERO,
            pnl_currency: Decimal::ZERO,
            exit_price: None,
            exit_time: None,
            candles_held: 0,
            unresolved_reason: Some(reason),
        }
    }
}

/// Parses a price field, accepting plain and scientific notation.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

const NAIVE_TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const OFFSET_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%z"];

/// Parses the timestamp formats written by the data fetcher and the signal
/// generator. Values without an offset are read as UTC; sub-second parts are
/// dropped.
pub fn parse_timestamp(raw: &str) -> AnyResult<DateTime<Utc>> {
    let trimmed = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(truncate_to_second(parsed.with_timezone(&Utc)));
    }
    for format in OFFSET_TIMESTAMP_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(trimmed, format) {
            return Ok(truncate_to_second(parsed.with_timezone(&Utc)));
        }
    }
    for format in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(truncate_to_second(parsed.and_utc()));
        }
    }
    if let Some(midnight) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }
    Err(anyhow!("Unrecognized timestamp '{}'", trimmed))
}

fn truncate_to_second(value: DateTime<Utc>) -> DateTime<Utc> {
    value.with_nanosecond(0).unwrap_or(value)
}
