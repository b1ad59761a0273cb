//! Range-expansion breakouts entered with day-stop orders.
//!
//! A candidate prints a `breakout_window` high (or low) on its widest bar of
//! the last `range_window` bars, in a trending market (ADX at least
//! `adx_min`). The stop order sits `entry_offset` beyond the breakout bar;
//! positions exit at `take_profit` of favourable move or when the stop trades.

use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::domain::error::RebalancerError;
use crate::domain::indicator::adx::calculate_adx;
use crate::domain::money::{floor_cents, QuantityRounding};
use crate::domain::ohlcv::PriceHistory;
use crate::domain::portfolio::SubPortfolio;
use crate::domain::position::OrderType;
use crate::ports::config_port::ConfigPort;

use super::engine::Engine;
use super::sizing::sweep_fallback;
use super::slots::{fill, rank, Candidate, RankOrder, Side, SlotBook};
use super::{usize_param, Cadence, Strategy, StrategySpec};

#[derive(Debug, Clone, PartialEq)]
pub struct BreakoutParams {
    pub slot_count: usize,
    pub breakout_window: usize,
    pub range_window: usize,
    pub entry_offset: f64,
    pub stop_offset: f64,
    pub take_profit: f64,
    pub adx_period: usize,
    pub adx_min: f64,
}

impl Default for BreakoutParams {
    fn default() -> Self {
        BreakoutParams {
            slot_count: 5,
            breakout_window: 60,
            range_window: 9,
            entry_offset: 0.1,
            stop_offset: 1.0,
            take_profit: 2.0,
            adx_period: 14,
            adx_min: 30.0,
        }
    }
}

impl BreakoutParams {
    pub fn from_config(config: &dyn ConfigPort, section: &str) -> Self {
        let d = Self::default();
        BreakoutParams {
            slot_count: usize_param(config, section, "slot_count", d.slot_count),
            breakout_window: usize_param(config, section, "breakout_window", d.breakout_window),
            range_window: usize_param(config, section, "range_window", d.range_window),
            entry_offset: config.get_double(section, "entry_offset", d.entry_offset),
            stop_offset: config.get_double(section, "stop_offset", d.stop_offset),
            take_profit: config.get_double(section, "take_profit", d.take_profit),
            adx_period: usize_param(config, section, "adx_period", d.adx_period),
            adx_min: config.get_double(section, "adx_min", d.adx_min),
        }
    }
}

pub struct BreakoutStopEntry {
    spec: StrategySpec,
    params: BreakoutParams,
    /// Candidates trending strongly enough to trade today.
    trending: BTreeSet<String>,
}

impl BreakoutStopEntry {
    pub fn new(spec: StrategySpec, params: BreakoutParams) -> Self {
        BreakoutStopEntry {
            spec,
            params,
            trending: BTreeSet::new(),
        }
    }

    /// Direction of a breakout on the latest bar, if any.
    fn breakout(&self, history: &PriceHistory) -> Option<Side> {
        let bars = history.bars();
        let last = bars.last()?;
        let window = &bars[bars.len().saturating_sub(self.params.breakout_window)..];
        let highest = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let lowest = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);

        let side = if last.high >= highest {
            Side::Long
        } else if last.low <= lowest {
            Side::Short
        } else {
            return None;
        };

        let ranges = &bars[bars.len().saturating_sub(self.params.range_window)..];
        let widest = ranges.iter().map(|b| b.range()).fold(0.0, f64::max);
        (last.range() >= widest).then_some(side)
    }
}

impl Strategy for BreakoutStopEntry {
    fn spec(&self) -> &StrategySpec {
        &self.spec
    }

    fn cadence(&self) -> Cadence {
        Cadence::Daily
    }

    fn init(&mut self, engine: &Engine) -> Result<(), RebalancerError> {
        self.trending = engine
            .candidates()
            .iter()
            .filter(|symbol| {
                engine
                    .history(symbol)
                    .and_then(|h| calculate_adx(h.bars(), self.params.adx_period).ok())
                    .and_then(|dmi| dmi.adx.last())
                    .is_some_and(|adx| adx >= self.params.adx_min)
            })
            .cloned()
            .collect();
        debug!(
            strategy = %engine.key(),
            trending = self.trending.len(),
            universe = engine.candidates().len(),
            "adx filter"
        );
        Ok(())
    }

    fn to_be_closed(&self, engine: &Engine, excluded: &BTreeSet<String>) -> BTreeSet<String> {
        let mut closing = BTreeSet::new();
        for (symbol, position) in engine.held_checks(excluded) {
            let gain = position.favourable_move();
            if gain > self.params.take_profit {
                info!(strategy = %engine.key(), symbol = %symbol, gain, "take profit");
                closing.insert(symbol.clone());
            } else if engine.bar(symbol).is_some_and(|bar| position.stop_triggered(bar)) {
                info!(strategy = %engine.key(), symbol = %symbol, stop = ?position.stop_price, "stopped out");
                closing.insert(symbol.clone());
            }
        }
        closing
    }

    fn allocate(
        &self,
        engine: &Engine,
        closing: &BTreeSet<String>,
        excluded: &BTreeSet<String>,
    ) -> Result<SubPortfolio, RebalancerError> {
        let p = &self.params;
        let mut ranked = Vec::new();
        for (symbol, history) in engine.entry_checks(closing, excluded) {
            if !self.trending.contains(symbol) {
                continue;
            }
            let (Some(side), Some(bar)) = (self.breakout(history), history.last()) else {
                continue;
            };
            let (entry, stop, target) = match side {
                Side::Long => (
                    floor_cents(bar.high + p.entry_offset),
                    floor_cents(bar.close - p.stop_offset),
                    floor_cents(bar.high + p.entry_offset + p.take_profit),
                ),
                Side::Short => (
                    floor_cents(bar.low - p.entry_offset),
                    floor_cents(bar.close + p.stop_offset),
                    floor_cents(bar.low - p.entry_offset - p.take_profit),
                ),
            };
            if entry <= 0.0 || bar.close <= 0.0 {
                continue;
            }
            let score = bar.range() / bar.close;
            debug!(strategy = %engine.key(), symbol = %symbol, ?side, entry, stop, score, "breakout");
            ranked.push(
                Candidate::new(symbol, score, entry, side)
                    .with_order(OrderType::DayStop)
                    .with_stop(stop)
                    .with_target(target),
            );
        }
        rank(&mut ranked, RankOrder::Descending);

        let mut target = engine.carry_forward(closing);
        let mut book = SlotBook::open(p.slot_count, engine, closing);
        fill(engine, &mut target, &mut book, &ranked, QuantityRounding::RoundCents);

        if let Some(fallback) = self.spec.fallback.as_deref() {
            sweep_fallback(engine, &mut target, fallback, QuantityRounding::Whole);
        }
        Ok(target)
    }
}
