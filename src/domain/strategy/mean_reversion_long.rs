//! Long mean reversion on weekly-oversold instruments, gated by a benchmark trend.
//!
//! New entries are only considered on the weekly rebalance day and only
//! while the benchmark's six-month return is positive. Stops and the
//! time-to-live are checked every day; the weekly RSI exit runs on Mondays.

use chrono::Duration;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::domain::calendar::is_monday;
use crate::domain::error::RebalancerError;
use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::indicator::stddev::return_volatility;
use crate::domain::money::{floor_cents, QuantityRounding};
use crate::domain::ohlcv::PriceHistory;
use crate::domain::portfolio::SubPortfolio;
use crate::domain::resample::weekly_closes;
use crate::ports::config_port::ConfigPort;

use super::engine::Engine;
use super::sizing::sweep_fallback;
use super::slots::{fill, rank, Candidate, RankOrder, Side, SlotBook};
use super::{usize_param, Cadence, Strategy, StrategySpec, BARS_PER_MONTH};

#[derive(Debug, Clone, PartialEq)]
pub struct LongParams {
    pub slot_count: usize,
    pub stop_percent: f64,
    pub rsi_period: usize,
    pub rsi_entry: f64,
    pub rsi_exit: f64,
    /// Calendar days a position may stay open; 0 disables the exit.
    pub ttl_days: i64,
    /// Benchmark trend horizon in bars.
    pub trend_bars: usize,
    pub volatility_window: usize,
}

impl Default for LongParams {
    fn default() -> Self {
        LongParams {
            slot_count: 10,
            stop_percent: 5.0,
            rsi_period: 2,
            rsi_entry: 20.0,
            rsi_exit: 70.0,
            ttl_days: 42,
            trend_bars: 126,
            volatility_window: 100,
        }
    }
}

impl LongParams {
    pub fn from_config(config: &dyn ConfigPort, section: &str) -> Self {
        let d = Self::default();
        LongParams {
            slot_count: usize_param(config, section, "slot_count", d.slot_count),
            stop_percent: config.get_double(section, "stop_percent", d.stop_percent),
            rsi_period: usize_param(config, section, "rsi_period", d.rsi_period),
            rsi_entry: config.get_double(section, "rsi_entry", d.rsi_entry),
            rsi_exit: config.get_double(section, "rsi_exit", d.rsi_exit),
            ttl_days: config.get_int(section, "ttl_days", d.ttl_days).max(0),
            trend_bars: usize_param(config, section, "trend_bars", d.trend_bars),
            volatility_window: usize_param(
                config,
                section,
                "volatility_window",
                d.volatility_window,
            ),
        }
    }
}

pub struct MeanReversionLong {
    spec: StrategySpec,
    params: LongParams,
}

impl MeanReversionLong {
    pub fn new(spec: StrategySpec, params: LongParams) -> Self {
        MeanReversionLong { spec, params }
    }

    fn weekly_rsi(&self, history: &PriceHistory) -> Option<f64> {
        calculate_rsi(&weekly_closes(history.bars()), self.params.rsi_period)
            .ok()
            .and_then(|s| s.last())
    }

    /// Benchmark close above its close `trend_bars` ago.
    fn trend_is_positive(&self, engine: &Engine) -> bool {
        let Some(history) = self.spec.benchmark.as_deref().and_then(|b| engine.history(b)) else {
            return false;
        };
        match (history.last_close(), history.close_back(self.params.trend_bars)) {
            (Some(now), Some(then)) => now > then,
            _ => false,
        }
    }

    fn candidates(
        &self,
        engine: &Engine,
        closing: &BTreeSet<String>,
        excluded: &BTreeSet<String>,
    ) -> Vec<Candidate> {
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
            let Some(rsi) = self.weekly_rsi(history) else {
                continue;
            };
            if rsi >= self.params.rsi_entry {
                continue;
            }
            if month_ago / close > 1.5 {
                warn!(
                    strategy = %engine.key(),
                    symbol = %symbol,
                    close,
                    month_ago,
                    "significant price drop; check for splits"
                );
            }
            let volatility = match return_volatility(history, self.params.volatility_window) {
                Ok(v) => v,
                Err(e) => {
                    debug!(strategy = %engine.key(), symbol = %symbol, error = %e, "volatility unavailable");
                    continue;
                }
            };
            let stop = floor_cents(close * (100.0 - self.params.stop_percent) / 100.0);
            ranked.push(Candidate::new(symbol, volatility, close, Side::Long).with_stop(stop));
        }
        rank(&mut ranked, RankOrder::Ascending);
        ranked
    }
}

impl Strategy for MeanReversionLong {
    fn spec(&self) -> &StrategySpec {
        &self.spec
    }

    /// Runs daily so exits and the fallback sweep happen every day; entries are weekly.
    fn cadence(&self) -> Cadence {
        Cadence::Daily
    }

    fn to_be_closed(&self, engine: &Engine, excluded: &BTreeSet<String>) -> BTreeSet<String> {
        let mut closing = BTreeSet::new();
        if is_monday(engine.as_of()) {
            for (symbol, _, history) in engine.exit_checks(excluded) {
                if let Some(rsi) = self.weekly_rsi(history) {
                    if rsi > self.params.rsi_exit {
                        info!(strategy = %engine.key(), symbol = %symbol, rsi, "weekly rsi exit");
                        closing.insert(symbol.clone());
                    }
                }
            }
        }
        for (symbol, position) in engine.held_checks(excluded) {
            if self.params.ttl_days > 0 {
                if let Some(entered) = position.entry_date {
                    if engine.as_of() - entered >= Duration::days(self.params.ttl_days) {
                        info!(strategy = %engine.key(), symbol = %symbol, %entered, "time to live expired");
                        closing.insert(symbol.clone());
                    }
                }
            }
            if engine.bar(symbol).is_some_and(|bar| position.stop_triggered(bar)) {
                info!(strategy = %engine.key(), symbol = %symbol, stop = ?position.stop_price, "stop triggered");
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
        let mut target = engine.carry_forward(closing);
        let entry_day = Cadence::Weekly.is_due(engine.as_of(), engine.portfolio().is_empty());

        if entry_day {
            if self.trend_is_positive(engine) {
                let ranked = self.candidates(engine, closing, excluded);
                let mut book = SlotBook::open(self.params.slot_count, engine, closing);
                fill(engine, &mut target, &mut book, &ranked, QuantityRounding::FloorCents);
            } else {
                info!(strategy = %engine.key(), "benchmark trend negative; no new entries");
            }
        }

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
    use chrono::NaiveDate;

    fn strategy() -> MeanReversionLong {
        let mut s = spec(
            StrategyKind::MeanReversionLong,
            StrategyParams::MeanReversionLong(LongParams::default()),
            253,
        );
        s.fallback = Some("SCHO".to_string());
        s.benchmark = Some("SPY".to_string());
        MeanReversionLong::new(s, LongParams::default())
    }

    fn falling() -> Vec<f64> {
        (0..253).map(|i| 200.0 - i as f64 * 0.5).collect()
    }

    fn engine_with(
        strategy: &MeanReversionLong,
        as_of: NaiveDate,
        benchmark: &[f64],
        previous: SubPortfolio,
    ) -> Engine {
        engine_over(strategy, as_of, benchmark, &["AAA"], previous)
    }

    /// Every symbol in `universe` follows the same steady decline.
    fn engine_over(
        strategy: &MeanReversionLong,
        as_of: NaiveDate,
        benchmark: &[f64],
        universe: &[&str],
        previous: SubPortfolio,
    ) -> Engine {
        let data = universe
            .iter()
            .fold(StaticData::default(), |data, s| {
                data.with(bars_from_closes(s, as_of, &falling()))
            })
            .with(bars_from_closes("SPY", as_of, benchmark))
            .with(bars_from_closes("SCHO", as_of, &[25.0; 253]));
        let universe: Vec<String> = universe.iter().map(|s| s.to_string()).collect();
        Engine::new(
            strategy.spec(),
            previous,
            as_of,
            &universe,
            &data,
            EngineSettings::default(),
        )
        .unwrap()
    }

    fn holding_stopped_aaa() -> SubPortfolio {
        let mut previous = SubPortfolio::seeded(10_000.0);
        previous.add_position(
            "AAA",
            Position::market(10.0, 80.0, date(2024, 2, 26)).with_stop(Some(76.0)),
        );
        previous
    }

    #[test]
    fn positive_trend_admits_oversold_candidate() {
        let strategy = strategy();
        let rising: Vec<f64> = (0..253).map(|i| 400.0 + i as f64).collect();
        let engine = engine_with(&strategy, date(2024, 3, 4), &rising, SubPortfolio::seeded(10_000.0));

        let allocation = engine.allocate(&strategy, &BTreeSet::new()).unwrap();
        let pos = allocation.portfolio.get_position("AAA").unwrap();
        assert_eq!(pos.entry_price, 74.0);
        assert_eq!(pos.stop_price, Some(70.3));
        assert_eq!(pos.quantity, floor_cents(995.0 / 74.0));
    }

    #[test]
    fn time_to_live_expires_mid_week() {
        let strategy = strategy();
        let flat = vec![400.0; 253];
        let mut previous = SubPortfolio::seeded(10_000.0);
        previous.add_position("AAA", Position::market(10.0, 74.0, date(2024, 1, 22)));
        // Wednesday, 44 days after entry
        let engine = engine_with(&strategy, date(2024, 3, 6), &flat, previous);
        let closing = strategy.to_be_closed(&engine, &BTreeSet::new());
        assert!(closing.contains("AAA"));
    }

    #[test]
    fn negative_trend_skips_oversold_newcomer_while_stop_fires() {
        let strategy = strategy();
        let declining: Vec<f64> = (0..253).map(|i| 400.0 - i as f64).collect();
        let engine = engine_over(
            &strategy,
            date(2024, 3, 4),
            &declining,
            &["AAA", "BBB"],
            holding_stopped_aaa(),
        );
        assert!(engine.candidates().contains(&"BBB".to_string()));

        let allocation = engine.allocate(&strategy, &BTreeSet::new()).unwrap();
        assert!(allocation.closed.contains("AAA"));
        assert!(!allocation.portfolio.has_position("AAA"));
        assert!(!allocation.portfolio.has_position("BBB"));
    }

    #[test]
    fn positive_trend_enters_oversold_newcomer_while_stop_fires() {
        let strategy = strategy();
        let rising: Vec<f64> = (0..253).map(|i| 400.0 + i as f64).collect();
        let engine = engine_over(
            &strategy,
            date(2024, 3, 4),
            &rising,
            &["AAA", "BBB"],
            holding_stopped_aaa(),
        );

        let allocation = engine.allocate(&strategy, &BTreeSet::new()).unwrap();
        assert!(allocation.closed.contains("AAA"));
        assert!(!allocation.portfolio.has_position("AAA"));
        let bbb = allocation.portfolio.get_position("BBB").unwrap();
        assert_eq!(bbb.entry_price, 74.0);
        assert_eq!(bbb.stop_price, Some(70.3));
    }

    #[test]
    fn stop_fires_on_held_position_with_short_history() {
        let strategy = strategy();
        let as_of = date(2024, 3, 4);
        let rising: Vec<f64> = (0..253).map(|i| 400.0 + i as f64).collect();
        // five bars only; yesterday's low is 74.25, under the 76 stop
        let data = StaticData::default()
            .with(bars_from_closes("AAA", as_of, &[79.0, 78.0, 77.0, 76.0, 75.0]))
            .with(bars_from_closes("SPY", as_of, &rising))
            .with(bars_from_closes("SCHO", as_of, &[25.0; 253]));
        let engine = Engine::new(
            strategy.spec(),
            holding_stopped_aaa(),
            as_of,
            &["AAA".to_string()],
            &data,
            EngineSettings::default(),
        )
        .unwrap();
        assert!(engine.history("AAA").is_none());
        assert!(engine.portfolio().has_position("AAA"));

        let allocation = engine.allocate(&strategy, &BTreeSet::new()).unwrap();
        assert!(allocation.closed.contains("AAA"));
        assert!(!allocation.portfolio.has_position("AAA"));
    }
}
