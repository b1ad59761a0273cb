//! Monthly trend filter over a fixed asset-class list.
//!
//! Every instrument owns an equal weight of the allocation and is held only
//! while its monthly close sits above the `sma_months` average of monthly
//! closes. Idle weight goes to the fallback.

use std::collections::BTreeSet;
use tracing::debug;

use crate::domain::error::RebalancerError;
use crate::domain::indicator::sma::calculate_sma;
use crate::domain::money::{floor_cents, QuantityRounding};
use crate::domain::portfolio::SubPortfolio;
use crate::domain::position::Position;
use crate::domain::resample::monthly_closes;
use crate::domain::universe::UniverseSource;
use crate::ports::config_port::ConfigPort;

use super::engine::Engine;
use super::sizing::sweep_fallback;
use super::{usize_param, Cadence, Strategy, StrategySpec};

#[derive(Debug, Clone, PartialEq)]
pub struct TrendParams {
    pub sma_months: usize,
    /// Quantity changes smaller than this keep the held size.
    pub min_delta: f64,
}

impl Default for TrendParams {
    fn default() -> Self {
        TrendParams {
            sma_months: 10,
            min_delta: 1.0,
        }
    }
}

impl TrendParams {
    pub fn from_config(config: &dyn ConfigPort, section: &str) -> Self {
        let d = Self::default();
        TrendParams {
            sma_months: usize_param(config, section, "sma_months", d.sma_months),
            min_delta: config.get_double(section, "min_delta", d.min_delta),
        }
    }
}

pub struct TrendFilter {
    spec: StrategySpec,
    params: TrendParams,
}

impl TrendFilter {
    pub fn new(spec: StrategySpec, params: TrendParams) -> Self {
        TrendFilter { spec, params }
    }

    /// Percent of the allocation each instrument owns.
    fn weight(&self, engine: &Engine) -> f64 {
        let listed = match &self.spec.universe {
            UniverseSource::Fixed(symbols) => symbols
                .iter()
                .filter(|s| !engine.is_reserved(s))
                .count(),
            UniverseSource::TopDollarVolume(_) => 0,
        };
        let size = if listed > 0 { listed } else { engine.candidates().len() };
        if size == 0 { 0.0 } else { 100.0 / size as f64 }
    }
}

impl Strategy for TrendFilter {
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
        let weight = self.weight(engine);
        let budget = floor_cents(engine.allocatable() * weight / 100.0);
        let mut target = engine.fresh_portfolio();

        for symbol in engine.candidates() {
            let Some(history) = engine.history(symbol) else {
                continue;
            };
            let Some(close) = history.last_close() else {
                continue;
            };
            let monthly = monthly_closes(history.bars());
            let Some(average) = calculate_sma(&monthly, self.params.sma_months)
                .ok()
                .and_then(|s| s.last())
            else {
                debug!(strategy = %engine.key(), symbol = %symbol, months = monthly.len(), "not enough monthly closes");
                continue;
            };
            if close <= average {
                debug!(strategy = %engine.key(), symbol = %symbol, close, average, "below trend");
                continue;
            }

            let mut quantity = floor_cents(budget / close);
            if let Some(held) = engine.portfolio().get_position(symbol) {
                if (quantity - held.quantity).abs() < self.params.min_delta {
                    quantity = held.quantity;
                }
            }
            if quantity >= 1.0 {
                debug!(strategy = %engine.key(), symbol = %symbol, close, average, quantity, "above trend");
                engine.place(&mut target, symbol, Position::market(quantity, close, engine.as_of()));
            }
        }

        if let Some(fallback) = self.spec.fallback.as_deref() {
            sweep_fallback(engine, &mut target, fallback, QuantityRounding::FloorCents);
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::engine::testing::*;
    use crate::domain::strategy::engine::EngineSettings;
    use crate::domain::strategy::{StrategyKind, StrategyParams};

    fn strategy() -> TrendFilter {
        let mut s = spec(
            StrategyKind::TrendFilter,
            StrategyParams::TrendFilter(TrendParams::default()),
            400,
        );
        s.universe = UniverseSource::Fixed(vec!["UP".to_string(), "DOWN".to_string()]);
        s.fallback = Some("BIL".to_string());
        TrendFilter::new(s, TrendParams::default())
    }

    fn data(as_of: chrono::NaiveDate) -> StaticData {
        let up: Vec<f64> = (0..400).map(|i| 50.0 + i as f64 * 0.1).collect();
        let down: Vec<f64> = (0..400).map(|i| 90.0 - i as f64 * 0.1).collect();
        StaticData::default()
            .with(bars_from_closes("UP", as_of, &up))
            .with(bars_from_closes("DOWN", as_of, &down))
            .with(bars_from_closes("BIL", as_of, &[100.0; 400]))
    }

    #[test]
    fn holds_only_instruments_above_their_monthly_average() {
        let as_of = date(2024, 4, 1);
        let strategy = strategy();
        let universe = vec!["UP".to_string(), "DOWN".to_string()];
        let engine = Engine::new(
            strategy.spec(),
            SubPortfolio::seeded(10_000.0),
            as_of,
            &universe,
            &data(as_of),
            EngineSettings::default(),
        )
        .unwrap();

        let allocation = engine.allocate(&strategy, &BTreeSet::new()).unwrap();
        let portfolio = allocation.portfolio;
        assert!(!portfolio.has_position("DOWN"));

        // half of 9950 at the last close
        let up = portfolio.get_position("UP").unwrap();
        assert_eq!(up.quantity, floor_cents(4975.0 / (50.0 + 399.0 * 0.1)));

        let bil = portfolio.get_position("BIL").unwrap();
        assert!(bil.fallback_sweep);
        assert!(bil.quantity > 49.0);
    }

    #[test]
    fn small_changes_keep_the_held_size() {
        let as_of = date(2024, 4, 1);
        let strategy = strategy();
        let mut previous = SubPortfolio::seeded(10_000.0);
        // bought at today's close so equity is unchanged
        let close = 50.0 + 399.0 * 0.1;
        let held = floor_cents(4975.0 / close) + 0.5;
        previous.add_position("UP", Position::market(held, close, date(2024, 3, 1)));
        let universe = vec!["UP".to_string(), "DOWN".to_string()];
        let engine = Engine::new(
            strategy.spec(),
            previous,
            as_of,
            &universe,
            &data(as_of),
            EngineSettings::default(),
        )
        .unwrap();

        let allocation = engine.allocate(&strategy, &BTreeSet::new()).unwrap();
        let up = allocation.portfolio.get_position("UP").unwrap();
        assert_eq!(up.quantity, held);
        assert_eq!(up.entry_date, Some(date(2024, 3, 1)));
        assert!(allocation.transitions.iter().all(|t| t.instrument != "UP"));
    }
}
