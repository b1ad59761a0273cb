//! Monthly top-N momentum with inverse-volatility weights.

use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::domain::error::RebalancerError;
use crate::domain::indicator::stddev::return_volatility;
use crate::domain::money::{floor_cents, quantity_for, QuantityRounding};
use crate::domain::ohlcv::PriceHistory;
use crate::domain::portfolio::SubPortfolio;
use crate::domain::position::Position;
use crate::ports::config_port::ConfigPort;

use super::engine::Engine;
use super::slots::{rank, Candidate, RankOrder, Side};
use super::{usize_param, Cadence, Strategy, StrategySpec, BARS_PER_MONTH};

#[derive(Debug, Clone, PartialEq)]
pub struct MomentumParams {
    pub top_n: usize,
    /// Return horizons averaged into the score.
    pub months: Vec<usize>,
    pub volatility_window: usize,
}

impl Default for MomentumParams {
    fn default() -> Self {
        MomentumParams {
            top_n: 5,
            months: vec![1, 3, 6, 12],
            volatility_window: 63,
        }
    }
}

impl MomentumParams {
    pub fn from_config(config: &dyn ConfigPort, section: &str) -> Self {
        let defaults = Self::default();
        let months: Vec<usize> = config
            .get_list(section, "months")
            .iter()
            .filter_map(|m| m.parse().ok())
            .filter(|m| *m > 0)
            .collect();
        MomentumParams {
            top_n: usize_param(config, section, "top_n", defaults.top_n),
            months: if months.is_empty() { defaults.months } else { months },
            volatility_window: usize_param(
                config,
                section,
                "volatility_window",
                defaults.volatility_window,
            ),
        }
    }
}

pub struct MomentumTopN {
    spec: StrategySpec,
    params: MomentumParams,
}

impl MomentumTopN {
    pub fn new(spec: StrategySpec, params: MomentumParams) -> Self {
        MomentumTopN { spec, params }
    }

    /// Mean of the configured return ratios, `None` when any horizon is out of range.
    fn score(&self, history: &PriceHistory) -> Option<f64> {
        if self.params.months.is_empty() {
            return None;
        }
        let mut total = 0.0;
        for months in &self.params.months {
            total += history.return_ratio(BARS_PER_MONTH.checked_mul(*months)?)?;
        }
        Some(total / self.params.months.len() as f64)
    }
}

impl Strategy for MomentumTopN {
    fn spec(&self) -> &StrategySpec {
        &self.spec
    }

    fn cadence(&self) -> Cadence {
        Cadence::Monthly
    }

    fn allocate(
        &self,
        engine: &Engine,
        _closing: &BTreeSet<String>,
        _excluded: &BTreeSet<String>,
    ) -> Result<SubPortfolio, RebalancerError> {
        let mut ranked = Vec::new();
        for symbol in engine.candidates() {
            let Some(history) = engine.history(symbol) else {
                continue;
            };
            let (Some(score), Some(close)) = (self.score(history), history.last_close()) else {
                debug!(strategy = %engine.key(), symbol = %symbol, "momentum horizon out of range");
                continue;
            };
            let inverse_vol = match return_volatility(history, self.params.volatility_window) {
                Ok(vol) if vol > 0.0 => 1.0 / vol,
                Ok(_) => {
                    debug!(strategy = %engine.key(), symbol = %symbol, "zero volatility");
                    continue;
                }
                Err(e) => {
                    debug!(strategy = %engine.key(), symbol = %symbol, error = %e, "volatility unavailable");
                    continue;
                }
            };
            debug!(strategy = %engine.key(), symbol = %symbol, score, inverse_vol, "ranked");
            ranked.push(Candidate::new(symbol, score, close, Side::Long).with_weight(inverse_vol));
        }
        rank(&mut ranked, RankOrder::Descending);
        ranked.truncate(self.params.top_n);

        let weight_sum: f64 = ranked.iter().map(|c| c.weight).sum();
        let mut target = engine.fresh_portfolio();
        if weight_sum <= 0.0 {
            return Ok(target);
        }
        for candidate in &ranked {
            let amount = engine.allocatable() * candidate.weight / weight_sum;
            let quantity = quantity_for(amount, candidate.price, QuantityRounding::Whole);
            if quantity >= 1.0 {
                debug!(
                    strategy = %engine.key(),
                    symbol = %candidate.symbol,
                    quantity,
                    value = floor_cents(quantity * candidate.price),
                    "allocated"
                );
                engine.place(
                    &mut target,
                    &candidate.symbol,
                    Position::market(quantity, candidate.price, engine.as_of()),
                );
            } else {
                warn!(
                    strategy = %engine.key(),
                    symbol = %candidate.symbol,
                    price = candidate.price,
                    amount,
                    "does not fit into its allocation"
                );
            }
        }
        Ok(target)
    }
}
