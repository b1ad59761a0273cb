//! Daily short mean reversion on overbought instruments in a downtrend.
//!
//! Entries are day-limit sells placed `entry_delta` percent above the close,
//! protected by a stop at the close one month back. Positions close when the
//! one-month return turns positive, RSI falls below `rsi_exit` or the stop trades.

use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::domain::error::RebalancerError;
use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::indicator::stddev::return_volatility;
use crate::domain::money::{floor_cents, QuantityRounding};
use crate::domain::portfolio::SubPortfolio;
use crate::domain::position::OrderType;
use crate::ports::config_port::ConfigPort;

use super::engine::Engine;
use super::sizing::sweep_fallback;
use super::slots::{fill, rank, Candidate, RankOrder, Side, SlotBook};
use super::{usize_param, Cadence, Strategy, StrategySpec, BARS_PER_MONTH};

#[derive(Debug, Clone, PartialEq)]
pub struct ShortParams {
    pub slot_count: usize,
    /// Percent above the close for the limit entry.
    pub entry_delta: f64,
    pub rsi_period: usize,
    pub rsi_entry: f64,
    pub rsi_exit: f64,
    pub volatility_window: usize,
}

impl Default for ShortParams {
    fn default() -> Self {
        ShortParams {
            slot_count: 5,
            entry_delta: 1.5,
            rsi_period: 2,
            rsi_entry: 70.0,
            rsi_exit: 15.0,
            volatility_window: 100,
        }
    }
}

impl ShortParams {
    pub fn from_config(config: &dyn ConfigPort, section: &str) -> Self {
        let d = Self::default();
        ShortParams {
            slot_count: usize_param(config, section, "slot_count", d.slot_count),
            entry_delta: config.get_double(section, "entry_delta", d.entry_delta),
            rsi_period: usize_param(config, section, "rsi_period", d.rsi_period),
            rsi_entry: config.get_double(section, "rsi_entry", d.rsi_entry),
            rsi_exit: config.get_double(section, "rsi_exit", d.rsi_exit),
            volatility_window: usize_param(
                config,
                section,
                "volatility_window",
                d.volatility_window,
            ),
        }
    }
}

pub struct MeanReversionShort {
    spec: StrategySpec,
    params: ShortParams,
}

impl MeanReversionShort {
    pub fn new(spec: StrategySpec, params: ShortParams) -> Self {
        MeanReversionShort { spec, params }
    }
}

impl Strategy for MeanReversionShort {
    fn spec(&self) -> &StrategySpec {
        &self.spec
    }

    fn cadence(&self) -> Cadence {
        Cadence::Daily
    }

    fn to_be_closed(&self, engine: &Engine, excluded: &BTreeSet<String>) -> BTreeSet<String> {
        let mut closing = BTreeSet::new();
        for (symbol, _, history) in engine.exit_checks(excluded) {
            let (Some(close), Some(month_ago)) =
                (history.last_close(), history.close_back(BARS_PER_MONTH))
            else {
                continue;
            };
            if close > month_ago {
                info!(strategy = %engine.key(), symbol = %symbol, "positive month; closing");
                closing.insert(symbol.clone());
            } else if let Some(rsi) = calculate_rsi(&history.closes(), self.params.rsi_period)
                .ok()
                .and_then(|s| s.last())
            {
                if rsi < self.params.rsi_exit {
                    info!(strategy = %engine.key(), symbol = %symbol, rsi, "rsi exit");
                    closing.insert(symbol.clone());
                }
            }
        }
        for (symbol, position) in engine.held_checks(excluded) {
            if engine.bar(symbol).is_some_and(|bar| position.stop_triggered(bar)) {
                info!(strategy = %engine.key(), symbol = %symbol, "stop triggered");
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
        let delta = self.params.entry_delta;
        let mut ranked = Vec::new();

        for (symbol, history) in engine.entry_checks(closing, excluded) {
            let (Some(close), Some(month_ago), Some(year_ago)) = (
                history.last_close(),
                history.close_back(BARS_PER_MONTH),
                history.close_back(BARS_PER_MONTH * 12),
            ) else {
                continue;
            };
            if close >= year_ago || close >= month_ago {
                continue;
            }
            let Some(rsi) = calculate_rsi(&history.closes(), self.params.rsi_period)
                .ok()
                .and_then(|s| s.last())
            else {
                continue;
            };
            if rsi <= self.params.rsi_entry {
                continue;
            }
            let threshold = floor_cents(close * (1.0 + delta * 2.0 / 100.0));
            if month_ago <= threshold {
                debug!(strategy = %engine.key(), symbol = %symbol, threshold, "too close to exit band");
                continue;
            }
            let volatility = match return_volatility(history, self.params.volatility_window) {
                Ok(v) => v,
                Err(e) => {
                    debug!(strategy = %engine.key(), symbol = %symbol, error = %e, "volatility unavailable");
                    continue;
                }
            };
            let entry = floor_cents(close * (1.0 + delta / 100.0));
            debug!(strategy = %engine.key(), symbol = %symbol, rsi, volatility, entry, "candidate");
            ranked.push(
                Candidate::new(symbol, volatility, entry, Side::Short)
                    .with_order(OrderType::DayLimit)
                    .with_stop(month_ago),
            );
        }
        rank(&mut ranked, RankOrder::Descending);

        let mut target = engine.carry_forward(closing);
        let mut book = SlotBook::open(self.params.slot_count, engine, closing);
        fill(engine, &mut target, &mut book, &ranked, QuantityRounding::FloorCents);

        if let Some(fallback) = self.spec.fallback.as_deref() {
            sweep_fallback(engine, &mut target, fallback, QuantityRounding::Whole);
        }
        Ok(target)
    }
}
