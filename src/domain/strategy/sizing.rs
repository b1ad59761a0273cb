//! Entry merging and fallback sweeps shared by every strategy.

use tracing::debug;

use crate::domain::money::{floor_cents, quantity_for, QuantityRounding};
use crate::domain::portfolio::SubPortfolio;
use crate::domain::position::Position;

use super::engine::Engine;

/// Combine a freshly sized position with the one held today.
///
/// Only same-direction Market positions merge. The merged position keeps
/// the previous entry date, stop and target; its entry price is the previous
/// one when the size shrinks and the quantity-weighted average when it grows.
pub fn merge_entry(previous: Option<&Position>, fresh: Position) -> Position {
    let Some(prev) = previous else {
        return fresh;
    };
    if prev.is_pending()
        || fresh.is_pending()
        || prev.quantity == 0.0
        || prev.quantity.signum() != fresh.quantity.signum()
    {
        return fresh;
    }

    let entry_price = if fresh.quantity.abs() <= prev.quantity.abs() {
        prev.entry_price
    } else {
        let added = fresh.quantity - prev.quantity;
        (prev.entry_price * prev.quantity + fresh.entry_price * added) / fresh.quantity
    };

    Position {
        entry_price,
        entry_date: prev.entry_date.or(fresh.entry_date),
        stop_price: prev.stop_price.or(fresh.stop_price),
        target_price: prev.target_price.or(fresh.target_price),
        last_fill_price: fresh.last_fill_price.or(prev.last_fill_price),
        ..fresh
    }
}

/// Notional of everything in `target` except `fallback`, at its last close.
pub fn deployed(target: &SubPortfolio, fallback: &str) -> f64 {
    target
        .positions
        .iter()
        .filter(|(symbol, _)| symbol.as_str() != fallback)
        .map(|(_, p)| (p.last_close * p.quantity).abs())
        .sum()
}

/// Park whatever `allocatable` leaves unused in the fallback instrument.
///
/// The fallback position is removed when the remainder buys less than one unit.
pub fn sweep_fallback(
    engine: &Engine,
    target: &mut SubPortfolio,
    fallback: &str,
    rounding: QuantityRounding,
) {
    let Some(price) = engine.last_close(fallback) else {
        target.remove_position(fallback);
        return;
    };
    let remainder = floor_cents(engine.allocatable() - deployed(target, fallback)).max(0.0);
    let quantity = quantity_for(remainder, price, rounding);

    if quantity >= 1.0 {
        debug!(
            strategy = %engine.key(),
            symbol = %fallback,
            quantity,
            value = floor_cents(quantity * price),
            "fallback sweep"
        );
        let mut position = Position::market(quantity, price, engine.as_of());
        position.fallback_sweep = true;
        engine.place(target, fallback, position);
    } else if target.remove_position(fallback).is_some() {
        debug!(strategy = %engine.key(), symbol = %fallback, "fallback position closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::OrderType;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn fresh_position_without_history_is_unchanged() {
        let fresh = Position::market(5.0, 10.0, day(4));
        assert_eq!(merge_entry(None, fresh.clone()), fresh);
    }

    #[test]
    fn shrinking_keeps_previous_entry_and_date() {
        let prev = Position::market(10.0, 50.0, day(1)).with_stop(Some(45.0));
        let fresh = Position::market(6.0, 60.0, day(4));
        let merged = merge_entry(Some(&prev), fresh);
        assert_eq!(merged.quantity, 6.0);
        assert_eq!(merged.entry_price, 50.0);
        assert_eq!(merged.entry_date, Some(day(1)));
        assert_eq!(merged.stop_price, Some(45.0));
        assert_eq!(merged.last_close, 60.0);
    }

    #[test]
    fn growing_averages_the_entry() {
        let prev = Position::market(10.0, 50.0, day(1));
        let fresh = Position::market(20.0, 60.0, day(4));
        let merged = merge_entry(Some(&prev), fresh);
        assert!((merged.entry_price - 55.0).abs() < 1e-9);
        assert_eq!(merged.entry_date, Some(day(1)));
    }

    #[test]
    fn direction_flip_starts_a_new_entry() {
        let prev = Position::market(10.0, 50.0, day(1));
        let fresh = Position::market(-4.0, 60.0, day(4));
        let merged = merge_entry(Some(&prev), fresh.clone());
        assert_eq!(merged, fresh);
    }

    #[test]
    fn pending_orders_never_merge() {
        let prev = Position::market(10.0, 50.0, day(1));
        let fresh = Position::pending(12.0, 48.0, OrderType::DayLimit, day(4));
        assert_eq!(merge_entry(Some(&prev), fresh.clone()), fresh);
    }

    #[test]
    fn deployed_ignores_the_fallback() {
        let mut sub = SubPortfolio::seeded(1000.0);
        sub.add_position("AAA", Position::market(-2.0, 100.0, day(4)));
        sub.add_position("SHY", Position::market(5.0, 80.0, day(4)));
        assert_eq!(deployed(&sub, "SHY"), 200.0);
    }
}
