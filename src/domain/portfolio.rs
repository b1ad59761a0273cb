//! Per-strategy sub-portfolio ledger.
//!
//! `balance` is the only independently stored monetary field; everything
//! else in [`Summary`] is derived from it and the positions by
//! [`SubPortfolio::recompute`], and floored to cents.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::money::floor_cents;
use super::position::Position;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub equity: f64,
    #[serde(default)]
    pub margin: f64,
    #[serde(default)]
    pub free_margin: f64,
    #[serde(default)]
    pub upnl: f64,
    #[serde(default)]
    pub cash: f64,
}

impl Summary {
    pub fn seeded(balance: f64) -> Self {
        let balance = floor_cents(balance);
        Summary {
            balance,
            equity: balance,
            margin: 0.0,
            free_margin: balance,
            upnl: 0.0,
            cash: balance,
        }
    }

    /// Field-wise sum, floored to cents.
    pub fn total<'a>(summaries: impl IntoIterator<Item = &'a Summary>) -> Summary {
        let mut total = Summary::default();
        for s in summaries {
            total.balance += s.balance;
            total.equity += s.equity;
            total.margin += s.margin;
            total.free_margin += s.free_margin;
            total.upnl += s.upnl;
            total.cash += s.cash;
        }
        Summary {
            balance: floor_cents(total.balance),
            equity: floor_cents(total.equity),
            margin: floor_cents(total.margin),
            free_margin: floor_cents(total.free_margin),
            upnl: floor_cents(total.upnl),
            cash: floor_cents(total.cash),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubPortfolio {
    #[serde(rename = "tickers", default)]
    pub positions: BTreeMap<String, Position>,
    #[serde(default)]
    pub summary: Summary,
}

impl SubPortfolio {
    pub fn seeded(balance: f64) -> Self {
        SubPortfolio {
            positions: BTreeMap::new(),
            summary: Summary::seeded(balance),
        }
    }

    pub fn add_position(&mut self, symbol: &str, position: Position) {
        self.positions.insert(symbol.to_string(), position);
    }

    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn remove_position(&mut self, symbol: &str) -> Option<Position> {
        self.positions.remove(symbol)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn symbols(&self) -> BTreeSet<String> {
        self.positions.keys().cloned().collect()
    }

    pub fn quantities(&self) -> BTreeMap<String, f64> {
        self.positions
            .iter()
            .map(|(s, p)| (s.clone(), p.quantity))
            .collect()
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.positions.values().map(Position::unrealized_pnl).sum()
    }

    /// Capital tied up at the latest close, pending orders included.
    pub fn committed(&self, leverage: f64) -> f64 {
        self.positions
            .values()
            .map(|p| floor_cents((p.last_close * p.quantity).abs() / leverage))
            .sum()
    }

    /// Re-derive equity, margin, free margin, upnl and cash from `balance`.
    pub fn recompute(&mut self, leverage: f64) {
        let upnl = floor_cents(self.unrealized_pnl());
        let margin: f64 = self
            .positions
            .values()
            .filter(|p| !p.is_pending())
            .map(|p| (p.entry_price * p.quantity).abs() / leverage)
            .sum();
        let balance = floor_cents(self.summary.balance);
        let equity = floor_cents(balance + upnl);
        let margin = floor_cents(margin);
        self.summary = Summary {
            balance,
            equity,
            margin,
            free_margin: floor_cents(equity - margin),
            upnl,
            cash: floor_cents(equity - self.committed(leverage)),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::OrderType;
    use chrono::NaiveDate;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    fn held(quantity: f64, entry: f64, close: f64) -> Position {
        let mut p = Position::market(quantity, entry, day());
        p.last_close = close;
        p
    }

    #[test]
    fn seeded_portfolio_is_all_cash() {
        let sub = SubPortfolio::seeded(2500.456);
        assert_eq!(sub.summary.balance, 2500.45);
        assert_eq!(sub.summary.equity, 2500.45);
        assert_eq!(sub.summary.cash, 2500.45);
        assert!(sub.is_empty());
    }

    #[test]
    fn add_get_remove_position() {
        let mut sub = SubPortfolio::seeded(1000.0);
        sub.add_position("SPY", held(1.0, 100.0, 100.0));
        assert!(sub.has_position("SPY"));
        assert_eq!(sub.position_count(), 1);
        assert!(sub.remove_position("SPY").is_some());
        assert!(sub.remove_position("SPY").is_none());
    }

    #[test]
    fn recompute_derives_every_field() {
        let mut sub = SubPortfolio::seeded(10_000.0);
        sub.add_position("AAA", held(10.0, 100.0, 110.0));
        sub.add_position("BBB", held(-5.0, 200.0, 190.0));
        sub.recompute(1.0);

        // upnl = 10*10 + (-5)*(-10) = 150
        assert_eq!(sub.summary.upnl, 150.0);
        assert_eq!(sub.summary.equity, 10_150.0);
        // margin = |100*10| + |200*-5| = 2000
        assert_eq!(sub.summary.margin, 2000.0);
        assert_eq!(sub.summary.free_margin, 8150.0);
        // committed at close = 1100 + 950
        assert_eq!(sub.summary.cash, 8100.0);
    }

    #[test]
    fn pending_orders_reserve_cash_but_no_margin() {
        let mut sub = SubPortfolio::seeded(10_000.0);
        sub.add_position(
            "AAA",
            Position::pending(10.0, 100.0, OrderType::DayLimit, day()),
        );
        sub.recompute(1.0);
        assert_eq!(sub.summary.margin, 0.0);
        assert_eq!(sub.summary.equity, 10_000.0);
        assert_eq!(sub.summary.cash, 9000.0);
    }

    #[test]
    fn leverage_scales_margin_and_committed_capital() {
        let mut sub = SubPortfolio::seeded(1000.0);
        sub.add_position("AAA", held(10.0, 100.0, 100.0));
        sub.recompute(2.0);
        assert_eq!(sub.summary.margin, 500.0);
        assert_eq!(sub.summary.cash, 500.0);
    }

    #[test]
    fn summary_total_sums_and_floors() {
        let a = Summary::seeded(100.005);
        let b = Summary::seeded(200.0);
        let total = Summary::total([&a, &b]);
        assert_eq!(total.balance, 300.0);
        assert_eq!(total.equity, 300.0);
    }

    #[test]
    fn serializes_positions_under_tickers() {
        let mut sub = SubPortfolio::seeded(100.0);
        sub.add_position("SPY", held(1.0, 10.0, 10.0));
        let json = serde_json::to_value(&sub).unwrap();
        assert!(json["tickers"]["SPY"].is_object());
        assert_eq!(json["summary"]["freeMargin"], 100.0);
        assert!(json["summary"].get("free_margin").is_none());
    }
}
