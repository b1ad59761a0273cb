//! Single-slot short on volatility spikes, adding lots while the spike extends.

use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::domain::error::RebalancerError;
use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::indicator::sma::calculate_sma;
use crate::domain::money::QuantityRounding;
use crate::domain::ohlcv::PriceHistory;
use crate::domain::portfolio::SubPortfolio;
use crate::ports::config_port::ConfigPort;

use super::engine::Engine;
use super::slots::{fill, pyramid, rank, Candidate, RankOrder, Side, SlotBook};
use super::{u32_param, usize_param, Cadence, Strategy, StrategySpec};

#[derive(Debug, Clone, PartialEq)]
pub struct SpikeParams {
    pub slot_count: usize,
    pub sma_period: usize,
    pub rsi_period: usize,
    pub rsi_entry: f64,
    pub max_lots: u32,
}

impl Default for SpikeParams {
    fn default() -> Self {
        SpikeParams {
            slot_count: 1,
            sma_period: 5,
            rsi_period: 4,
            rsi_entry: 70.0,
            max_lots: 4,
        }
    }
}

impl SpikeParams {
    pub fn from_config(config: &dyn ConfigPort, section: &str) -> Self {
        let d = Self::default();
        SpikeParams {
            slot_count: usize_param(config, section, "slot_count", d.slot_count),
            sma_period: usize_param(config, section, "sma_period", d.sma_period),
            rsi_period: usize_param(config, section, "rsi_period", d.rsi_period),
            rsi_entry: config.get_double(section, "rsi_entry", d.rsi_entry),
            max_lots: u32_param(config, section, "max_lots", d.max_lots),
        }
    }
}

pub struct VolatilitySpike {
    spec: StrategySpec,
    params: SpikeParams,
}

impl VolatilitySpike {
    pub fn new(spec: StrategySpec, params: SpikeParams) -> Self {
        VolatilitySpike { spec, params }
    }

    fn sma(&self, history: &PriceHistory) -> Option<f64> {
        calculate_sma(&history.closes(), self.params.sma_period)
            .ok()
            .and_then(|s| s.last())
    }

    fn rsi(&self, history: &PriceHistory) -> Option<f64> {
        calculate_rsi(&history.closes(), self.params.rsi_period)
            .ok()
            .and_then(|s| s.last())
    }
}

impl Strategy for VolatilitySpike {
    fn spec(&self) -> &StrategySpec {
        &self.spec
    }

    fn cadence(&self) -> Cadence {
        Cadence::Daily
    }

    fn to_be_closed(&self, engine: &Engine, excluded: &BTreeSet<String>) -> BTreeSet<String> {
        let mut closing = BTreeSet::new();
        for (symbol, _, history) in engine.exit_checks(excluded) {
            let (Some(close), Some(sma)) = (history.last_close(), self.sma(history)) else {
                continue;
            };
            if close < sma {
                info!(strategy = %engine.key(), symbol = %symbol, close, sma, "close below average");
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
            let (Some(close), Some(rsi)) = (history.last_close(), self.rsi(history)) else {
                continue;
            };
            let reference = position.last_fill_price.unwrap_or(position.entry_price);
            let lots = position.lots.unwrap_or(1);
            if close > reference && lots < self.params.max_lots {
                adds.push(
                    Candidate::new(symbol, (rsi - 50.0).abs(), close, Side::Short)
                        .with_lots(lots + 1),
                );
            }
        }

        let mut ranked = Vec::new();
        for (symbol, history) in engine.entry_checks(closing, excluded) {
            let (Some(close), Some(sma), Some(rsi)) =
                (history.last_close(), self.sma(history), self.rsi(history))
            else {
                continue;
            };
            debug!(strategy = %engine.key(), symbol = %symbol, close, sma, rsi, "checked");
            if close > sma && rsi > self.params.rsi_entry {
                ranked.push(Candidate::new(symbol, (rsi - 50.0).abs(), close, Side::Short).with_lots(1));
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::Position;
    use crate::domain::strategy::engine::testing::*;
    use crate::domain::strategy::engine::EngineSettings;
    use crate::domain::strategy::{StrategyKind, StrategyParams};

    fn strategy() -> VolatilitySpike {
        let mut s = spec(
            StrategyKind::VolatilitySpike,
            StrategyParams::VolatilitySpike(SpikeParams::default()),
            202,
        );
        s.universe = crate::domain::universe::UniverseSource::Fixed(vec!["VXX".to_string()]);
        VolatilitySpike::new(s, SpikeParams::default())
    }

    fn spike() -> Vec<f64> {
        let mut closes = vec![20.0; 197];
        closes.extend([21.0, 23.0, 26.0, 30.0, 35.0]);
        closes
    }

    #[test]
    fn spike_opens_short() {
        let as_of = date(2024, 3, 5);
        let data = StaticData::default().with(bars_from_closes("VXX", as_of, &spike()));
        let strategy = strategy();
        let engine = Engine::new(
            strategy.spec(),
            SubPortfolio::seeded(10_000.0),
            as_of,
            &["VXX".to_string()],
            &data,
            EngineSettings::default(),
        )
        .unwrap();

        let allocation = engine.allocate(&strategy, &BTreeSet::new()).unwrap();
        let pos = allocation.portfolio.get_position("VXX").unwrap();
        // one tenth of 9950 at 35
        assert_eq!(pos.quantity, -28.43);
        assert_eq!(pos.lots, Some(1));
    }

    #[test]
    fn collapse_below_average_closes() {
        let as_of = date(2024, 3, 5);
        let mut closes = spike();
        closes.extend([25.0, 20.0]);
        let data = StaticData::default().with(bars_from_closes("VXX", as_of, &closes));
        let mut previous = SubPortfolio::seeded(10_000.0);
        let mut held = Position::market(-28.43, 35.0, date(2024, 3, 1));
        held.lots = Some(1);
        previous.add_position("VXX", held);

        let strategy = strategy();
        let engine = Engine::new(
            strategy.spec(),
            previous,
            as_of,
            &["VXX".to_string()],
            &data,
            EngineSettings::default(),
        )
        .unwrap();

        let allocation = engine.allocate(&strategy, &BTreeSet::new()).unwrap();
        assert!(allocation.closed.contains("VXX"));
        assert!(allocation.portfolio.is_empty());
        // (20 - 35) * -28.43 realized
        assert_eq!(allocation.portfolio.summary.balance, 10_426.45);
    }
}
