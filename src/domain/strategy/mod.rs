//! Rebalancing strategies sharing one lifecycle.
//!
//! Each concrete strategy implements [`Strategy`]; the shared plumbing
//! (day-order resolution, mark-to-market, slot accounting, entry merging,
//! fallback sweeps, diffing) lives in [`engine`], [`slots`] and [`sizing`].

pub mod breadth;
pub mod breakout;
pub mod connors;
pub mod engine;
pub mod mean_reversion_long;
pub mod mean_reversion_short;
pub mod momentum;
pub mod sizing;
pub mod slots;
pub mod trend_filter;
pub mod two_period;
pub mod volatility_spike;

use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fmt;

use crate::domain::calendar::{is_first_business_day_of_month, is_monday};
use crate::domain::error::RebalancerError;
use crate::domain::portfolio::SubPortfolio;
use crate::domain::universe::{resolve_universe, UniverseSource};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;

use engine::Engine;

/// Trading days per month in return lookbacks.
pub const BARS_PER_MONTH: usize = 21;

/// How often a strategy re-evaluates its full ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily,
    /// Mondays.
    Weekly,
    /// First business day of the month.
    Monthly,
}

impl Cadence {
    /// An empty sub-portfolio rebalances regardless of the calendar.
    pub fn is_due(self, date: NaiveDate, portfolio_empty: bool) -> bool {
        portfolio_empty
            || match self {
                Cadence::Daily => true,
                Cadence::Weekly => is_monday(date),
                Cadence::Monthly => is_first_business_day_of_month(date),
            }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    MomentumTopN,
    BreadthTilt,
    MeanReversionShort,
    MeanReversionLong,
    ConnorsMeanReversion,
    TwoPeriodSwing,
    VolatilitySpike,
    BreakoutStopEntry,
    TrendFilter,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 9] = [
        StrategyKind::MomentumTopN,
        StrategyKind::BreadthTilt,
        StrategyKind::MeanReversionShort,
        StrategyKind::MeanReversionLong,
        StrategyKind::ConnorsMeanReversion,
        StrategyKind::TwoPeriodSwing,
        StrategyKind::VolatilitySpike,
        StrategyKind::BreakoutStopEntry,
        StrategyKind::TrendFilter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::MomentumTopN => "momentum_top_n",
            StrategyKind::BreadthTilt => "breadth_tilt",
            StrategyKind::MeanReversionShort => "mean_reversion_short",
            StrategyKind::MeanReversionLong => "mean_reversion_long",
            StrategyKind::ConnorsMeanReversion => "connors_mean_reversion",
            StrategyKind::TwoPeriodSwing => "two_period_swing",
            StrategyKind::VolatilitySpike => "volatility_spike",
            StrategyKind::BreakoutStopEntry => "breakout_stop_entry",
            StrategyKind::TrendFilter => "trend_filter",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_lowercase();
        StrategyKind::ALL.into_iter().find(|k| k.as_str() == value)
    }

    /// Kinds that sweep unused capital into a fallback instrument.
    pub fn needs_fallback(self) -> bool {
        matches!(
            self,
            StrategyKind::BreadthTilt
                | StrategyKind::MeanReversionShort
                | StrategyKind::MeanReversionLong
                | StrategyKind::ConnorsMeanReversion
                | StrategyKind::BreakoutStopEntry
                | StrategyKind::TrendFilter
        )
    }

    pub fn needs_benchmark(self) -> bool {
        matches!(self, StrategyKind::MeanReversionLong)
    }

    pub fn default_lookback(self) -> usize {
        match self {
            StrategyKind::ConnorsMeanReversion => 110,
            StrategyKind::TwoPeriodSwing | StrategyKind::VolatilitySpike => 202,
            StrategyKind::BreakoutStopEntry => 70,
            _ => 253,
        }
    }

    /// Built-in instrument list for kinds that trade a fixed basket.
    pub fn default_universe(self) -> Option<Vec<String>> {
        let symbols: &[&str] = match self {
            StrategyKind::TrendFilter => &[
                "VTI", "VB", "VEU", "VWO", "BND", "TIP", "VNQ", "RWX", "PDBC", "COMT",
            ],
            StrategyKind::VolatilitySpike => &["VXX"],
            _ => return None,
        };
        Some(symbols.iter().map(|s| s.to_string()).collect())
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Kind-specific tuning, defaulted from constants and overridable per section.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyParams {
    MomentumTopN(momentum::MomentumParams),
    BreadthTilt(breadth::BreadthParams),
    MeanReversionShort(mean_reversion_short::ShortParams),
    MeanReversionLong(mean_reversion_long::LongParams),
    ConnorsMeanReversion(connors::ConnorsParams),
    TwoPeriodSwing(two_period::SwingParams),
    VolatilitySpike(volatility_spike::SpikeParams),
    BreakoutStopEntry(breakout::BreakoutParams),
    TrendFilter(trend_filter::TrendParams),
}

impl StrategyParams {
    pub fn from_config(kind: StrategyKind, config: &dyn ConfigPort, section: &str) -> Self {
        match kind {
            StrategyKind::MomentumTopN => {
                StrategyParams::MomentumTopN(momentum::MomentumParams::from_config(config, section))
            }
            StrategyKind::BreadthTilt => {
                StrategyParams::BreadthTilt(breadth::BreadthParams::from_config(config, section))
            }
            StrategyKind::MeanReversionShort => StrategyParams::MeanReversionShort(
                mean_reversion_short::ShortParams::from_config(config, section),
            ),
            StrategyKind::MeanReversionLong => StrategyParams::MeanReversionLong(
                mean_reversion_long::LongParams::from_config(config, section),
            ),
            StrategyKind::ConnorsMeanReversion => StrategyParams::ConnorsMeanReversion(
                connors::ConnorsParams::from_config(config, section),
            ),
            StrategyKind::TwoPeriodSwing => {
                StrategyParams::TwoPeriodSwing(two_period::SwingParams::from_config(config, section))
            }
            StrategyKind::VolatilitySpike => StrategyParams::VolatilitySpike(
                volatility_spike::SpikeParams::from_config(config, section),
            ),
            StrategyKind::BreakoutStopEntry => StrategyParams::BreakoutStopEntry(
                breakout::BreakoutParams::from_config(config, section),
            ),
            StrategyKind::TrendFilter => {
                StrategyParams::TrendFilter(trend_filter::TrendParams::from_config(config, section))
            }
        }
    }
}

/// Everything configured for one strategy key.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategySpec {
    pub key: String,
    pub kind: StrategyKind,
    /// Share of the initial balance, in percent.
    pub percent: f64,
    pub universe: UniverseSource,
    pub fallback: Option<String>,
    pub benchmark: Option<String>,
    pub lookback: usize,
    pub params: StrategyParams,
}

impl StrategySpec {
    pub fn section(key: &str) -> String {
        format!("strategy.{key}")
    }

    /// Benchmark and fallback: fetched always, never ranked as candidates.
    pub fn reserved_symbols(&self) -> BTreeSet<String> {
        self.fallback
            .iter()
            .chain(self.benchmark.iter())
            .cloned()
            .collect()
    }

    pub fn mandatory_symbols(&self) -> Vec<String> {
        self.reserved_symbols().into_iter().collect()
    }
}

pub trait Strategy {
    fn spec(&self) -> &StrategySpec;

    fn cadence(&self) -> Cadence;

    fn key(&self) -> &str {
        &self.spec().key
    }

    /// Instruments to fetch for today, in ranking order.
    fn get_universe(
        &self,
        data_port: &dyn DataPort,
        as_of: NaiveDate,
    ) -> Result<Vec<String>, RebalancerError> {
        resolve_universe(&self.spec().universe, data_port, as_of)
    }

    /// Hook run once the engine has loaded data, before any allocation.
    fn init(&mut self, _engine: &Engine) -> Result<(), RebalancerError> {
        Ok(())
    }

    /// Held instruments whose exit condition is met today.
    fn to_be_closed(&self, _engine: &Engine, _excluded: &BTreeSet<String>) -> BTreeSet<String> {
        BTreeSet::new()
    }

    /// Tomorrow's sub-portfolio, without the `closing` instruments.
    fn allocate(
        &self,
        engine: &Engine,
        closing: &BTreeSet<String>,
        excluded: &BTreeSet<String>,
    ) -> Result<SubPortfolio, RebalancerError>;
}

pub fn build_strategy(spec: StrategySpec) -> Box<dyn Strategy> {
    match spec.params.clone() {
        StrategyParams::MomentumTopN(p) => Box::new(momentum::MomentumTopN::new(spec, p)),
        StrategyParams::BreadthTilt(p) => Box::new(breadth::BreadthTilt::new(spec, p)),
        StrategyParams::MeanReversionShort(p) => {
            Box::new(mean_reversion_short::MeanReversionShort::new(spec, p))
        }
        StrategyParams::MeanReversionLong(p) => {
            Box::new(mean_reversion_long::MeanReversionLong::new(spec, p))
        }
        StrategyParams::ConnorsMeanReversion(p) => {
            Box::new(connors::ConnorsMeanReversion::new(spec, p))
        }
        StrategyParams::TwoPeriodSwing(p) => Box::new(two_period::TwoPeriodSwing::new(spec, p)),
        StrategyParams::VolatilitySpike(p) => {
            Box::new(volatility_spike::VolatilitySpike::new(spec, p))
        }
        StrategyParams::BreakoutStopEntry(p) => {
            Box::new(breakout::BreakoutStopEntry::new(spec, p))
        }
        StrategyParams::TrendFilter(p) => Box::new(trend_filter::TrendFilter::new(spec, p)),
    }
}

pub(crate) fn usize_param(config: &dyn ConfigPort, section: &str, key: &str, default: usize) -> usize {
    config.get_int(section, key, default as i64).max(0) as usize
}

pub(crate) fn u32_param(config: &dyn ConfigPort, section: &str, key: &str, default: u32) -> u32 {
    config
        .get_int(section, key, i64::from(default))
        .clamp(0, i64::from(u32::MAX)) as u32
}
