//! ConnorsRSI pullback entries via day-limit buys below the close.

use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::domain::error::RebalancerError;
use crate::domain::indicator::connors::{
    calculate_connors_rsi, DEFAULT_RANK_WINDOW, DEFAULT_RSI_PERIOD, DEFAULT_STREAK_PERIOD,
};
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
pub struct ConnorsParams {
    pub slot_count: usize,
    /// Setup when ConnorsRSI closes below this.
    pub crsi_entry: f64,
    /// Setup requires the close in the bottom `range_percent` of the day's range.
    pub range_percent: f64,
    /// Limit price discount below the close, in percent.
    pub limit_discount: f64,
    pub crsi_exit: f64,
    pub rsi_period: usize,
    pub streak_period: usize,
    pub rank_window: usize,
}

impl Default for ConnorsParams {
    fn default() -> Self {
        ConnorsParams {
            slot_count: 15,
            crsi_entry: 10.0,
            range_percent: 50.0,
            limit_discount: 4.0,
            crsi_exit: 50.0,
            rsi_period: DEFAULT_RSI_PERIOD,
            streak_period: DEFAULT_STREAK_PERIOD,
            rank_window: DEFAULT_RANK_WINDOW,
        }
    }
}

impl ConnorsParams {
    pub fn from_config(config: &dyn ConfigPort, section: &str) -> Self {
        let d = Self::default();
        ConnorsParams {
            slot_count: usize_param(config, section, "slot_count", d.slot_count),
            crsi_entry: config.get_double(section, "crsi_entry", d.crsi_entry),
            range_percent: config.get_double(section, "range_percent", d.range_percent),
            limit_discount: config.get_double(section, "limit_discount", d.limit_discount),
            crsi_exit: config.get_double(section, "crsi_exit", d.crsi_exit),
            rsi_period: usize_param(config, section, "rsi_period", d.rsi_period),
            streak_period: usize_param(config, section, "streak_period", d.streak_period),
            rank_window: usize_param(config, section, "rank_window", d.rank_window),
        }
    }
}

pub struct ConnorsMeanReversion {
    spec: StrategySpec,
    params: ConnorsParams,
}

impl ConnorsMeanReversion {
    pub fn new(spec: StrategySpec, params: ConnorsParams) -> Self {
        ConnorsMeanReversion { spec, params }
    }

    fn crsi(&self, history: &PriceHistory) -> Option<f64> {
        calculate_connors_rsi(
            &history.closes(),
            self.params.rsi_period,
            self.params.streak_period,
            self.params.rank_window,
        )
        .ok()
        .and_then(|s| s.last())
    }
}

impl Strategy for ConnorsMeanReversion {
    fn spec(&self) -> &StrategySpec {
        &self.spec
    }

    fn cadence(&self) -> Cadence {
        Cadence::Daily
    }

    fn to_be_closed(&self, engine: &Engine, excluded: &BTreeSet<String>) -> BTreeSet<String> {
        engine
            .exit_checks(excluded)
            .filter_map(|(symbol, _, history)| {
                let crsi = self.crsi(history)?;
                (crsi > self.params.crsi_exit).then(|| {
                    info!(strategy = %engine.key(), symbol = %symbol, crsi, "connors rsi exit");
                    symbol.clone()
                })
            })
            .collect()
    }

    fn allocate(
        &self,
        engine: &Engine,
        closing: &BTreeSet<String>,
        excluded: &BTreeSet<String>,
    ) -> Result<SubPortfolio, RebalancerError> {
        let mut ranked = Vec::new();
        for (symbol, history) in engine.entry_checks(closing, excluded) {
            let Some(bar) = history.last() else {
                continue;
            };
            let Some(crsi) = self.crsi(history) else {
                continue;
            };
            let bottom = bar.low + bar.range() * self.params.range_percent / 100.0;
            if crsi < self.params.crsi_entry && bar.close < bottom {
                let entry = floor_cents(bar.close * (100.0 - self.params.limit_discount) / 100.0);
                debug!(strategy = %engine.key(), symbol = %symbol, crsi, entry, "setup");
                ranked.push(
                    Candidate::new(symbol, crsi, entry, Side::Long).with_order(OrderType::DayLimit),
                );
            }
        }
        rank(&mut ranked, RankOrder::Ascending);

        let mut target = engine.carry_forward(closing);
        let mut book = SlotBook::open(self.params.slot_count, engine, closing);
        fill(engine, &mut target, &mut book, &ranked, QuantityRounding::RoundCents);

        if let Some(fallback) = self.spec.fallback.as_deref() {
            sweep_fallback(engine, &mut target, fallback, QuantityRounding::Whole);
        }
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

    fn strategy() -> ConnorsMeanReversion {
        let mut s = spec(
            StrategyKind::ConnorsMeanReversion,
            StrategyParams::ConnorsMeanReversion(ConnorsParams::default()),
            110,
        );
        s.fallback = Some("SPLG".to_string());
        ConnorsMeanReversion::new(s, ConnorsParams::default())
    }

    /// Gently rising, then three sharp down closes at the low of the day.
    fn pullback() -> Vec<crate::domain::ohlcv::OhlcvBar> {
        let as_of = date(2024, 3, 5);
        let mut closes: Vec<f64> = (0..107).map(|i| 100.0 + i as f64 * 0.1).collect();
        closes.extend([105.0, 100.0, 95.0]);
        let mut bars = bars_from_closes("AAA", as_of, &closes);
        if let Some(last) = bars.last_mut() {
            last.high = 100.0;
            last.low = 94.9;
        }
        bars
    }

    #[test]
    fn oversold_close_near_low_places_limit_buy() {
        let as_of = date(2024, 3, 5);
        let data = StaticData::default()
            .with(pullback())
            .with(bars_from_closes("SPLG", as_of, &[60.0; 110]));
        let strategy = strategy();
        let engine = Engine::new(
            strategy.spec(),
            SubPortfolio::seeded(15_000.0),
            as_of,
            &["AAA".to_string()],
            &data,
            EngineSettings::default(),
        )
        .unwrap();

        let allocation = engine.allocate(&strategy, &BTreeSet::new()).unwrap();
        let order = allocation.portfolio.get_position("AAA").unwrap();
        assert_eq!(order.order_type, OrderType::DayLimit);
        assert_eq!(order.entry_price, 91.2);
        // slot = floor_cents(14925 / 15) = 995
        assert_eq!(order.quantity, 10.91);
        assert!(allocation.transitions[0].description.contains("DAY LIMIT order at 91.2"));
    }

    #[test]
    fn strong_close_triggers_exit() {
        let as_of = date(2024, 3, 5);
        let closes: Vec<f64> = (0..110).map(|i| 100.0 + i as f64 * 0.5).collect();
        let data = StaticData::default()
            .with(bars_from_closes("AAA", as_of, &closes))
            .with(bars_from_closes("SPLG", as_of, &[60.0; 110]));
        let mut previous = SubPortfolio::seeded(15_000.0);
        previous.add_position("AAA", Position::market(10.0, 100.0, date(2024, 2, 1)));
        let strategy = strategy();
        let engine = Engine::new(
            strategy.spec(),
            previous,
            as_of,
            &["AAA".to_string()],
            &data,
            EngineSettings::default(),
        )
        .unwrap();
        assert!(strategy.to_be_closed(&engine, &BTreeSet::new()).contains("AAA"));
    }
}
