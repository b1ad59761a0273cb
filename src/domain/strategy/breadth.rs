//! Weekly breadth tilt: each positive monthly return adds a slice of capital.

use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::domain::error::RebalancerError;
use crate::domain::money::{floor_cents, quantity_for, QuantityRounding};
use crate::domain::portfolio::SubPortfolio;
use crate::domain::position::Position;
use crate::ports::config_port::ConfigPort;

use super::engine::Engine;
use super::sizing::sweep_fallback;
use super::{usize_param, Cadence, Strategy, StrategySpec, BARS_PER_MONTH};

#[derive(Debug, Clone, PartialEq)]
pub struct BreadthParams {
    pub months: usize,
    /// Percent of allocatable capital per positive month.
    pub points_per_month: f64,
}

impl Default for BreadthParams {
    fn default() -> Self {
        BreadthParams {
            months: 5,
            points_per_month: 5.0,
        }
    }
}

impl BreadthParams {
    pub fn from_config(config: &dyn ConfigPort, section: &str) -> Self {
        let defaults = Self::default();
        BreadthParams {
            months: usize_param(config, section, "months", defaults.months),
            points_per_month: config.get_double(
                section,
                "points_per_month",
                defaults.points_per_month,
            ),
        }
    }
}

pub struct BreadthTilt {
    spec: StrategySpec,
    params: BreadthParams,
}

impl BreadthTilt {
    pub fn new(spec: StrategySpec, params: BreadthParams) -> Self {
        BreadthTilt { spec, params }
    }
}

impl Strategy for BreadthTilt {
    fn spec(&self) -> &StrategySpec {
        &self.spec
    }

    fn cadence(&self) -> Cadence {
        Cadence::Weekly
    }

    fn allocate(
        &self,
        engine: &Engine,
        _closing: &BTreeSet<String>,
        _excluded: &BTreeSet<String>,
    ) -> Result<SubPortfolio, RebalancerError> {
        let mut target = engine.fresh_portfolio();

        for symbol in engine.candidates() {
            let Some(history) = engine.history(symbol) else {
                continue;
            };
            let Some(close) = history.last_close() else {
                continue;
            };
            // horizons past the history end the scan
            let hits = (1..=self.params.months)
                .map_while(|n| {
                    BARS_PER_MONTH
                        .checked_mul(n)
                        .and_then(|bars| history.close_back(bars))
                })
                .filter(|past| close > *past)
                .count();
            let score = hits as f64 * self.params.points_per_month;
            debug!(strategy = %engine.key(), symbol = %symbol, score, "breadth score");
            if score <= 0.0 {
                continue;
            }

            let amount = engine.allocatable() * score / 100.0;
            let quantity = quantity_for(amount, close, QuantityRounding::Whole);
            if quantity >= 1.0 {
                debug!(
                    strategy = %engine.key(),
                    symbol = %symbol,
                    quantity,
                    value = floor_cents(quantity * close),
                    "allocated"
                );
                engine.place(&mut target, symbol, Position::market(quantity, close, engine.as_of()));
            } else {
                warn!(strategy = %engine.key(), symbol = %symbol, price = close, amount, "does not fit into its allocation");
            }
        }

        if let Some(fallback) = self.spec.fallback.as_deref() {
            sweep_fallback(engine, &mut target, fallback, QuantityRounding::Whole);
        }
        Ok(target)
    }
}
