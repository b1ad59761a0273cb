//! Day-over-day transition diff between two sub-portfolios.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::money::{floor_cents, round_cents};
use super::portfolio::SubPortfolio;
use super::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "Buy"),
            TradeAction::Sell => write!(f, "Sell"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub instrument: String,
    pub action: TradeAction,
    /// Unsigned magnitude.
    pub quantity: f64,
    pub description: String,
}

impl TransitionRecord {
    pub fn signed_quantity(&self) -> f64 {
        match self.action {
            TradeAction::Buy => self.quantity,
            TradeAction::Sell => -self.quantity,
        }
    }
}

fn describe(
    action: TradeAction,
    symbol: &str,
    delta: f64,
    old_qty: f64,
    new: Option<&Position>,
) -> String {
    let new_qty = new.map_or(0.0, |p| p.quantity);
    let mut text = format!(
        "{action} {} of {symbol}, change from {old_qty} to {new_qty}",
        delta.abs()
    );
    if let Some(pos) = new {
        if pos.is_pending() {
            text.push_str(&format!(
                ", using {} order at {}",
                pos.order_type.label(),
                pos.entry_price
            ));
        }
        if old_qty == 0.0 {
            if let Some(stop) = pos.stop_price {
                text.push_str(&format!(", stop {stop}"));
            }
        }
    }
    text
}

/// Buy/sell records turning `old` quantities into `new` ones.
///
/// Sells come first, then buys; each group is ordered by symbol.
pub fn diff_positions(old: &SubPortfolio, new: &SubPortfolio) -> Vec<TransitionRecord> {
    let symbols: BTreeSet<&String> = old.positions.keys().chain(new.positions.keys()).collect();
    let mut sells = Vec::new();
    let mut buys = Vec::new();

    for symbol in symbols {
        let old_qty = old.get_position(symbol).map_or(0.0, |p| p.quantity);
        let new_pos = new.get_position(symbol);
        let new_qty = new_pos.map_or(0.0, |p| p.quantity);
        let delta = round_cents(new_qty - old_qty);
        if delta == 0.0 {
            continue;
        }
        let action = if delta > 0.0 {
            TradeAction::Buy
        } else {
            TradeAction::Sell
        };
        let record = TransitionRecord {
            instrument: symbol.clone(),
            action,
            quantity: delta.abs(),
            description: describe(action, symbol, delta, old_qty, new_pos),
        };
        match action {
            TradeAction::Sell => sells.push(record),
            TradeAction::Buy => buys.push(record),
        }
    }

    sells.extend(buys);
    sells
}

/// Realized P&L of moving from `old` to `new`, in symbol order.
///
/// Closing, shrinking or flipping a filled position realizes
/// `(last_close - entry) * closed_quantity`; pending orders realize nothing.
pub fn realized_pnl(old: &SubPortfolio, new: &SubPortfolio) -> f64 {
    let mut realized = 0.0;
    for (symbol, prev) in &old.positions {
        if prev.is_pending() {
            continue;
        }
        let closed = match new.get_position(symbol) {
            None => prev.quantity,
            Some(next) if next.is_pending() => prev.quantity,
            Some(next) if next.quantity.signum() != prev.quantity.signum() => prev.quantity,
            Some(next) if next.quantity.abs() < prev.quantity.abs() => {
                prev.quantity - next.quantity
            }
            Some(_) => 0.0,
        };
        realized += closed * (prev.last_close - prev.entry_price);
    }
    realized
}

/// Carry `old`'s balance into `new`, book realized P&L and re-derive the summary.
///
/// Equity moves only by what was already marked to market; the allocation
/// itself never creates or destroys equity.
pub fn settle(old: &SubPortfolio, new: &mut SubPortfolio, leverage: f64) -> f64 {
    let realized = floor_cents(realized_pnl(old, new));
    new.summary.balance = floor_cents(old.summary.balance + realized);
    new.recompute(leverage);
    realized
}

/// Replay `records` on top of `quantities`, dropping symbols that reach zero.
pub fn apply_transitions(
    quantities: &BTreeMap<String, f64>,
    records: &[TransitionRecord],
) -> BTreeMap<String, f64> {
    let mut out = quantities.clone();
    for record in records {
        let entry = out.entry(record.instrument.clone()).or_insert(0.0);
        *entry = round_cents(*entry + record.signed_quantity());
    }
    out.retain(|_, q| *q != 0.0);
    out
}
