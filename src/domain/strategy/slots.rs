//! Fixed-capacity slot accounting shared by the slot strategies.
//!
//! A strategy admits at most `slot_count` concurrent non-fallback positions.
//! Held positions not flagged for close occupy a slot; ranked candidates
//! fill the free ones, and a candidate that sizes below one unit hands its
//! slot back so the fallback sweep can absorb the budget.

use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::domain::money::{floor_cents, quantity_for, QuantityRounding};
use crate::domain::portfolio::SubPortfolio;
use crate::domain::position::{OrderType, Position};

use super::engine::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotBook {
    slot_count: usize,
    occupied: usize,
}

impl SlotBook {
    /// Occupancy is clamped to `slot_count`.
    pub fn new(slot_count: usize, occupied: usize) -> Self {
        SlotBook {
            slot_count,
            occupied: occupied.min(slot_count),
        }
    }

    /// Count today's held slot positions that survive `closing`.
    pub fn open(slot_count: usize, engine: &Engine, closing: &BTreeSet<String>) -> Self {
        let occupied = engine
            .portfolio()
            .positions
            .iter()
            .filter(|(s, p)| !closing.contains(*s) && !p.fallback_sweep && !engine.is_reserved(s))
            .count();
        if occupied > slot_count {
            warn!(
                strategy = %engine.key(),
                occupied,
                slot_count,
                "more positions held than slots"
            );
        }
        SlotBook::new(slot_count, occupied)
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn occupied(&self) -> usize {
        self.occupied
    }

    pub fn free(&self) -> usize {
        self.slot_count - self.occupied
    }

    /// Claim one free slot; `false` when full.
    pub fn take(&mut self) -> bool {
        if self.occupied < self.slot_count {
            self.occupied += 1;
            true
        } else {
            false
        }
    }

    pub fn release(&mut self) {
        self.occupied = self.occupied.saturating_sub(1);
    }

    /// Money per slot.
    pub fn slot_budget(&self, allocatable: f64) -> f64 {
        if self.slot_count == 0 {
            return 0.0;
        }
        floor_cents(allocatable / self.slot_count as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn of(quantity: f64) -> Side {
        if quantity < 0.0 { Side::Short } else { Side::Long }
    }
}

/// One ranked entry candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub symbol: String,
    pub score: f64,
    /// Market close or day-order trigger price.
    pub price: f64,
    pub side: Side,
    pub order_type: OrderType,
    pub stop_price: Option<f64>,
    pub target_price: Option<f64>,
    pub lots: Option<u32>,
    /// Fraction of a slot budget this candidate sizes against.
    pub weight: f64,
}

impl Candidate {
    pub fn new(symbol: &str, score: f64, price: f64, side: Side) -> Self {
        Candidate {
            symbol: symbol.to_string(),
            score,
            price,
            side,
            order_type: OrderType::Market,
            stop_price: None,
            target_price: None,
            lots: None,
            weight: 1.0,
        }
    }

    pub fn with_order(mut self, order_type: OrderType) -> Self {
        self.order_type = order_type;
        self
    }

    pub fn with_stop(mut self, stop: f64) -> Self {
        self.stop_price = Some(stop);
        self
    }

    pub fn with_target(mut self, target: f64) -> Self {
        self.target_price = Some(target);
        self
    }

    /// Lot-scaled sizing: `lots / 10` of a slot.
    pub fn with_lots(mut self, lots: u32) -> Self {
        self.lots = Some(lots);
        self.weight = f64::from(lots) / 10.0;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn quantity(&self, budget: f64, rounding: QuantityRounding) -> f64 {
        quantity_for(budget * self.weight, self.price, rounding)
    }

    /// Position for `magnitude` units in this candidate's direction.
    pub fn position(&self, magnitude: f64, as_of: NaiveDate) -> Position {
        let quantity = magnitude.abs() * self.side.sign();
        let mut position = if self.order_type.is_pending() {
            Position::pending(quantity, self.price, self.order_type, as_of)
        } else {
            Position::market(quantity, self.price, as_of)
        };
        position.stop_price = self.stop_price;
        position.target_price = self.target_price;
        position.lots = self.lots;
        if self.lots.is_some() {
            position.last_fill_price = Some(self.price);
        }
        position
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrder {
    Ascending,
    Descending,
}

/// Stable sort by score, ties broken by symbol.
pub fn rank(candidates: &mut [Candidate], order: RankOrder) {
    candidates.sort_by(|a, b| {
        let by_score = a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal);
        let by_score = match order {
            RankOrder::Ascending => by_score,
            RankOrder::Descending => by_score.reverse(),
        };
        by_score.then_with(|| a.symbol.cmp(&b.symbol))
    });
}

/// Place ranked candidates into free slots; returns the symbols placed.
pub fn fill(
    engine: &Engine,
    target: &mut SubPortfolio,
    book: &mut SlotBook,
    ranked: &[Candidate],
    rounding: QuantityRounding,
) -> Vec<String> {
    let budget = book.slot_budget(engine.allocatable());
    let mut placed = Vec::new();
    for candidate in ranked {
        if !book.take() {
            break;
        }
        let quantity = candidate.quantity(budget, rounding);
        if quantity >= 1.0 {
            debug!(
                strategy = %engine.key(),
                symbol = %candidate.symbol,
                price = candidate.price,
                quantity,
                score = candidate.score,
                "slot filled"
            );
            engine.place(
                target,
                &candidate.symbol,
                candidate.position(quantity, engine.as_of()),
            );
            placed.push(candidate.symbol.clone());
        } else {
            debug!(
                strategy = %engine.key(),
                symbol = %candidate.symbol,
                price = candidate.price,
                budget,
                "candidate does not fit a slot"
            );
            book.release();
        }
    }
    placed
}

/// Resize held positions to their new lot count; they already own a slot.
pub fn pyramid(
    engine: &Engine,
    target: &mut SubPortfolio,
    adds: &[Candidate],
    budget: f64,
    rounding: QuantityRounding,
) {
    for add in adds {
        let quantity = add.quantity(budget, rounding);
        if quantity >= 1.0 {
            debug!(
                strategy = %engine.key(),
                symbol = %add.symbol,
                lots = ?add.lots,
                quantity,
                "pyramid add"
            );
            engine.place(target, &add.symbol, add.position(quantity, engine.as_of()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    #[test]
    fn new_book_clamps_overflow() {
        let book = SlotBook::new(3, 5);
        assert_eq!(book.occupied(), 3);
        assert_eq!(book.free(), 0);
    }

    #[test]
    fn take_and_release() {
        let mut book = SlotBook::new(2, 1);
        assert!(book.take());
        assert!(!book.take());
        book.release();
        assert_eq!(book.free(), 1);
    }

    #[test]
    fn slot_budget_is_floored() {
        let book = SlotBook::new(3, 0);
        assert_eq!(book.slot_budget(1000.0), 333.33);
        assert_eq!(SlotBook::new(0, 0).slot_budget(1000.0), 0.0);
    }

    #[test]
    fn rank_breaks_ties_by_symbol() {
        let mut candidates = vec![
            Candidate::new("CCC", 1.0, 10.0, Side::Long),
            Candidate::new("AAA", 1.0, 10.0, Side::Long),
            Candidate::new("BBB", 2.0, 10.0, Side::Long),
        ];
        rank(&mut candidates, RankOrder::Descending);
        let order: Vec<&str> = candidates.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(order, vec!["BBB", "AAA", "CCC"]);

        rank(&mut candidates, RankOrder::Ascending);
        let order: Vec<&str> = candidates.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(order, vec!["AAA", "CCC", "BBB"]);
    }

    #[test]
    fn candidate_position_carries_order_details() {
        let candidate = Candidate::new("XLE", 0.0, 80.12, Side::Short)
            .with_order(OrderType::DayLimit)
            .with_stop(84.0);
        let position = candidate.position(12.5, day());
        assert_eq!(position.quantity, -12.5);
        assert_eq!(position.order_type, OrderType::DayLimit);
        assert_eq!(position.stop_price, Some(84.0));
        assert_eq!(position.last_close, 80.12);
    }

    #[test]
    fn lots_scale_the_budget() {
        let candidate = Candidate::new("VXX", 0.0, 10.0, Side::Short).with_lots(3);
        assert_eq!(candidate.quantity(1000.0, QuantityRounding::RoundCents), 30.0);
        assert_eq!(candidate.position(30.0, day()).last_fill_price, Some(10.0));
    }

    proptest! {
        #[test]
        fn occupied_plus_free_is_slot_count(
            slot_count in 0usize..20,
            held in 0usize..30,
            ops in prop::collection::vec(any::<bool>(), 0..40),
        ) {
            let mut book = SlotBook::new(slot_count, held);
            prop_assert_eq!(book.occupied() + book.free(), slot_count);
            for take in ops {
                if take {
                    book.take();
                } else {
                    book.release();
                }
                prop_assert_eq!(book.occupied() + book.free(), book.slot_count());
                prop_assert!(book.occupied() <= slot_count);
            }
        }
    }
}
