use crate::models::{
    Candle, Direction, OutcomeState, TradeOutcome, TradeRecord, UnresolvedReason,
};
use log::debug;
use rust_decimal::Decimal;

/// Exit triggered by a single forward candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandleExit {
    pub state: OutcomeState,
    pub price: Decimal,
}

/// Finds the candle stamped exactly at `trade.timestamp`.
///
/// The series is sorted with unique timestamps, so a binary search is still an
/// exact-equality lookup. There is deliberately no nearest-candle fallback.
pub fn locate_entry_candle(candles: &[Candle], trade: &TradeRecord) -> Option<usize> {
    candles
        .binary_search_by(|candle| candle.timestamp.cmp(&trade.timestamp))
        .ok()
}

/// Checks one forward candle against the trade's levels.
///
/// The stop is tested before the target: when a candle's range spans both, the
/// trade is assumed to have been stopped out.
pub fn exit_on_candle(trade: &TradeRecord, candle: &Candle) -> Option<CandleExit> {
    match trade.direction {
        Direction::Buy => {
            if candle.low <= trade.stop_loss {
                Some(CandleExit {
                    state: OutcomeState::Loss,
                    price: trade.stop_loss,
                })
            } else if candle.high >= trade.take_profit {
                Some(CandleExit {
                    state: OutcomeState::Win,
                    price: trade.take_profit,
                })
            } else {
                None
            }
        }
        Direction::Sell => {
            if candle.high >= trade.stop_loss {
                Some(CandleExit {
                    state: OutcomeState::Loss,
                    price: trade.stop_loss,
                })
            } else if candle.low <= trade.take_profit {
                Some(CandleExit {
                    state: OutcomeState::Win,
                    price: trade.take_profit,
                })
            } else {
                None
            }
        }
    }
}

/// Simulates one trade against its ticker's full candle series.
///
/// `pnl_currency` is left at zero; currency conversion happens when the
/// outcome is priced with the ticker's cost model.
pub fn simulate_trade(trade: &TradeRecord, candles: &[Candle], spread: Decimal) -> TradeOutcome {
    let Some(entry_index) = locate_entry_candle(candles, trade) else {
        let reason = if candles.is_empty() {
            UnresolvedReason::EmptySeries
        } else {
            UnresolvedReason::NoEntryCandle
        };
        debug!(
            "{} {} at {} unresolved: {}",
            trade.ticker,
            trade.direction,
            trade.timestamp,
            reason.describe()
        );
        return TradeOutcome::unresolved(trade.clone(), reason);
    };

    let forward = &candles[entry_index + 1..];
    for (offset, candle) in forward.iter().enumerate() {
        let Some(exit) = exit_on_candle(trade, candle) else {
            continue;
        };
        let pnl_price_units = trade.direction.price_move(trade.entry, exit.price) - spread;
        return TradeOutcome {
            trade: trade.clone(),
            state: exit.state,
            pnl_price_units,
            pnl_currency: Decimal::ZERO,
            exit_price: Some(exit.price),
            exit_time: Some(candle.timestamp),
            candles_held: offset + 1,
            unresolved_reason: None,
        };
    }

    // The entry candle exists, so the series has a last candle.
    let last = &candles[candles.len() - 1];
    let pnl_price_units = trade.direction.price_move(trade.entry, last.close) - spread;
    TradeOutcome {
        trade: trade.clone(),
        state: OutcomeState::Open,
        pnl_price_units,
        pnl_currency: Decimal::ZERO,
        exit_price: Some(last.close),
        exit_time: Some(last.timestamp),
        candles_held: forward.len(),
        unresolved_reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap()
    }

    fn candle(step: i64, low: Decimal, high: Decimal, close: Decimal) -> Candle {
        Candle {
            timestamp: base_time() + Duration::minutes(5 * step),
            open: close,
            high,
            low,
            close,
            volume: 100,
        }
    }

    fn trade(
        direction: Direction,
        entry: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
    ) -> TradeRecord {
        TradeRecord {
            ticker: "GC=F".to_string(),
            timestamp: base_time(),
            direction,
            entry,
            stop_loss,
            take_profit,
        }
    }

    #[test]
    fn buy_stopped_out_on_second_forward_candle() {
        let candles = vec![
            candle(0, dec!(1998), dec!(2001), dec!(2000)),
            candle(1, dec!(1995), dec!(2005), dec!(2002)),
            candle(2, dec!(1985), dec!(1998), dec!(1990)),
            candle(3, dec!(2010), dec!(2030), dec!(2025)),
        ];
        let trade = trade(Direction::Buy, dec!(2000), dec!(1990), dec!(2020));

        let outcome = simulate_trade(&trade, &candles, dec!(0.5));

        assert_eq!(outcome.state, OutcomeState::Loss);
        assert_eq!(outcome.pnl_price_units, dec!(-10.5));
        assert_eq!(outcome.exit_price, Some(dec!(1990)));
        assert_eq!(outcome.exit_time, Some(candles[2].timestamp));
        assert_eq!(outcome.candles_held, 2);
    }

    #[test]
    fn sell_hits_target_when_stop_untouched() {
        let candles = vec![
            candle(0, dec!(1.1990), dec!(1.2005), dec!(1.2000)),
            candle(1, dec!(1.1940), dec!(1.2010), dec!(1.1960)),
        ];
        let trade = trade(Direction::Sell, dec!(1.2000), dec!(1.2050), dec!(1.1950));

        let outcome = simulate_trade(&trade, &candles, dec!(0.0002));

        assert_eq!(outcome.state, OutcomeState::Win);
        assert_eq!(outcome.pnl_price_units, dec!(0.0048));
    }

    #[test]
    fn untriggered_buy_is_marked_to_last_close() {
        let candles = vec![
            candle(0, dec!(99), dec!(101), dec!(100)),
            candle(1, dec!(98), dec!(104), dec!(102)),
            candle(2, dec!(97), dec!(106), dec!(103)),
        ];
        let trade = trade(Direction::Buy, dec!(100), dec!(95), dec!(110));

        let outcome = simulate_trade(&trade, &candles, dec!(0.25));

        assert_eq!(outcome.state, OutcomeState::Open);
        assert_eq!(outcome.pnl_price_units, dec!(2.75));
        assert_eq!(outcome.exit_price, Some(dec!(103)));
        assert_eq!(outcome.candles_held, 2);
    }

    #[test]
    fn candle_spanning_stop_and_target_counts_as_loss() {
        let candles = vec![
            candle(0, dec!(99), dec!(101), dec!(100)),
            candle(1, dec!(90), dec!(120), dec!(115)),
        ];
        let buy = trade(Direction::Buy, dec!(100), dec!(95), dec!(110));
        let sell = trade(Direction::Sell, dec!(100), dec!(110), dec!(95));

        let buy_outcome = simulate_trade(&buy, &candles, Decimal::ZERO);
        let sell_outcome = simulate_trade(&sell, &candles, Decimal::ZERO);

        assert_eq!(buy_outcome.state, OutcomeState::Loss);
        assert_eq!(buy_outcome.pnl_price_units, dec!(-5));
        assert_eq!(sell_outcome.state, OutcomeState::Loss);
        assert_eq!(sell_outcome.pnl_price_units, dec!(-10));
    }

    #[test]
    fn entry_candle_range_is_not_scanned() {
        let candles = vec![
            candle(0, dec!(80), dec!(130), dec!(100)),
            candle(1, dec!(99), dec!(111), dec!(110)),
        ];
        let trade = trade(Direction::Buy, dec!(100), dec!(95), dec!(110));

        let outcome = simulate_trade(&trade, &candles, Decimal::ZERO);

        assert_eq!(outcome.state, OutcomeState::Win);
        assert_eq!(outcome.pnl_price_units, dec!(10));
    }

    #[test]
    fn missing_entry_candle_is_unresolved_with_zero_pnl() {
        let candles = vec![
            candle(1, dec!(99), dec!(101), dec!(100)),
            candle(2, dec!(80), dec!(130), dec!(100)),
        ];
        let trade = trade(Direction::Buy, dec!(100), dec!(95), dec!(110));

        let outcome = simulate_trade(&trade, &candles, dec!(0.5));

        assert_eq!(outcome.state, OutcomeState::Unresolved);
        assert_eq!(outcome.pnl_price_units, Decimal::ZERO);
        assert_eq!(
            outcome.unresolved_reason,
            Some(UnresolvedReason::NoEntryCandle)
        );
    }

    #[test]
    fn nearby_timestamp_does_not_match_entry() {
        let mut shifted = candle(0, dec!(99), dec!(101), dec!(100));
        shifted.timestamp += Duration::seconds(1);
        let candles = vec![shifted, candle(1, dec!(80), dec!(130), dec!(100))];
        let trade = trade(Direction::Buy, dec!(100), dec!(95), dec!(110));

        let outcome = simulate_trade(&trade, &candles, Decimal::ZERO);

        assert_eq!(outcome.state, OutcomeState::Unresolved);
    }

    #[test]
    fn empty_series_is_unresolved() {
        let trade = trade(Direction::Sell, dec!(100), dec!(105), dec!(90));

        let outcome = simulate_trade(&trade, &[], dec!(0.5));

        assert_eq!(outcome.state, OutcomeState::Unresolved);
        assert_eq!(outcome.unresolved_reason, Some(UnresolvedReason::EmptySeries));
        assert_eq!(outcome.pnl_price_units, Decimal::ZERO);
    }

    #[test]
    fn entry_on_last_candle_is_open_against_its_own_close() {
        let candles = vec![
            candle(-1, dec!(99), dec!(101), dec!(100)),
            candle(0, dec!(100), dec!(102), dec!(101)),
        ];
        let trade = trade(Direction::Sell, dec!(101.5), dec!(105), dec!(95));

        let outcome = simulate_trade(&trade, &candles, dec!(0.1));

        assert_eq!(outcome.state, OutcomeState::Open);
        assert_eq!(outcome.pnl_price_units, dec!(0.4));
        assert_eq!(outcome.candles_held, 0);
    }
}
