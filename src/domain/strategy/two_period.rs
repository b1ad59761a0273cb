//! Two-period RSI swing trades in the direction of the 200-bar trend.
//!
//! Two consecutive RSI readings beyond the entry level open a one-lot
//! position; each further adverse close adds a lot up to `max_lots`.

use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::domain::error::RebalancerError;
use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::indicator::sma::calculate_sma;
use crate::domain::money::QuantityRounding;
use crate::domain::portfolio::SubPortfolio;
use crate::ports::config_port::ConfigPort;

use super::engine::Engine;
use super::slots::{fill, pyramid, rank, Candidate, RankOrder, Side, SlotBook};
use super::{u32_param, usize_param, Cadence, Strategy, StrategySpec};

#[derive(Debug, Clone, PartialEq)]
pub struct SwingParams {
    pub slot_count: usize,
    pub sma_period: usize,
    pub rsi_period: usize,
    pub long_entry: f64,
    pub long_exit: f64,
    pub short_entry: f64,
    pub short_exit: f64,
    pub max_lots: u32,
}

impl Default for SwingParams {
    fn default() -> Self {
        SwingParams {
            slot_count: 2,
            sma_period: 200,
            rsi_period: 2,
            long_entry: 25.0,
            long_exit: 70.0,
            short_entry: 75.0,
            short_exit: 30.0,
            max_lots: 4,
        }
    }
}

impl SwingParams {
    pub fn from_config(config: &dyn ConfigPort, section: &str) -> Self {
        let d = Self::default();
        SwingParams {
            slot_count: usize_param(config, section, "slot_count", d.slot_count),
            sma_period: usize_param(config, section, "sma_period", d.sma_period),
            rsi_period: usize_param(config, section, "rsi_period", d.rsi_period),
            long_entry: config.get_double(section, "long_entry", d.long_entry),
            long_exit: config.get_double(section, "long_exit", d.long_exit),
            short_entry: config.get_double(section, "short_entry", d.short_entry),
            short_exit: config.get_double(section, "short_exit", d.short_exit),
            max_lots: u32_param(config, section, "max_lots", d.max_lots),
        }
    }
}

pub struct TwoPeriodSwing {
    spec: StrategySpec,
    params: SwingParams,
}

impl TwoPeriodSwing {
    pub fn new(spec: StrategySpec, params: SwingParams) -> Self {
        TwoPeriodSwing { spec, params }
    }

    /// Latest and previous RSI readings.
    fn rsi_pair(&self, closes: &[f64]) -> Option<(f64, f64)> {
        let series = calculate_rsi(closes, self.params.rsi_period).ok()?;
        Some((series.back(0)?, series.back(1)?))
    }
}

impl Strategy for TwoPeriodSwing {
    fn spec(&self) -> &StrategySpec {
        &self.spec
    }

    fn cadence(&self) -> Cadence {
        Cadence::Daily
    }

    fn to_be_closed(&self, engine: &Engine, excluded: &BTreeSet<String>) -> BTreeSet<String> {
        let mut closing = BTreeSet::new();
        for (symbol, position, history) in engine.exit_checks(excluded) {
            let Some((rsi, _)) = self.rsi_pair(&history.closes()) else {
                continue;
            };
            let exit = (position.is_long() && rsi > self.params.long_exit)
                || (position.is_short() && rsi < self.params.short_exit);
            if exit {
                info!(strategy = %engine.key(), symbol = %symbol, rsi, "rsi exit");
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
        let mut adds = Vec::new();
        for (symbol, position, history) in engine.exit_checks(excluded) {
            if closing.contains(symbol) {
                continue;
            }
            let (Some(close), Some((rsi, _))) = (history.last_close(), self.rsi_pair(&history.closes()))
            else {
                continue;
            };
            let reference = position.last_fill_price.unwrap_or(position.entry_price);
            let adverse = (position.is_long() && close < reference)
                || (position.is_short() && close > reference);
            let lots = position.lots.unwrap_or(1);
            if adverse && lots < self.params.max_lots {
                adds.push(
                    Candidate::new(symbol, (rsi - 50.0).abs(), close, Side::of(position.quantity))
                        .with_lots(lots + 1),
                );
            }
        }

        let mut ranked = Vec::new();
        for (symbol, history) in engine.entry_checks(closing, excluded) {
            let closes = history.closes();
            let (Some(close), Some((rsi, prev_rsi))) = (history.last_close(), self.rsi_pair(&closes))
            else {
                continue;
            };
            let Some(sma) = calculate_sma(&closes, self.params.sma_period)
                .ok()
                .and_then(|s| s.last())
            else {
                continue;
            };
            let side = if close > sma
                && prev_rsi < self.params.long_entry
                && rsi < self.params.long_entry
            {
                Side::Long
            } else if close < sma
                && prev_rsi > self.params.short_entry
                && rsi > self.params.short_entry
            {
                Side::Short
            } else {
                continue;
            };
            debug!(strategy = %engine.key(), symbol = %symbol, rsi, sma, ?side, "setup");
            ranked.push(Candidate::new(symbol, (rsi - 50.0).abs(), close, side).with_lots(1));
        }
        rank(&mut ranked, RankOrder::Descending);

        let mut target = engine.carry_forward(closing);
        let mut book = SlotBook::open(self.params.slot_count, engine, closing);
        let budget = book.slot_budget(engine.allocatable());
        pyramid(engine, &mut target, &adds, budget, QuantityRounding::RoundCents);
        fill(engine, &mut target, &mut book, &ranked, QuantityRounding::RoundCents);
        Ok(target)
    }
}
