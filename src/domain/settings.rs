//! Typed run settings assembled from a validated [`ConfigPort`].

use std::path::PathBuf;
use tracing::error;

use crate::domain::config_validation::validate_config;
use crate::domain::error::RebalancerError;
use crate::domain::strategy::engine::EngineSettings;
use crate::domain::strategy::{usize_param, StrategyKind, StrategyParams, StrategySpec};
use crate::domain::universe::{parse_symbols, UniverseQuery, UniverseSource};
use crate::ports::config_port::ConfigPort;

pub const PORTFOLIO: &str = "portfolio";
pub const DATA: &str = "data";
pub const BROKER: &str = "broker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Csv,
    Sqlite,
}

impl DataSource {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "csv" => Some(DataSource::Csv),
            "sqlite" => Some(DataSource::Sqlite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSettings {
    pub source: DataSource,
    /// CSV directory or SQLite database file.
    pub path: PathBuf,
    pub pool_size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub name: String,
    pub work_dir: PathBuf,
    pub initial_balance: f64,
    pub engine: EngineSettings,
    /// In run order.
    pub strategies: Vec<StrategySpec>,
    pub data: DataSettings,
    pub broker_statement: Option<PathBuf>,
}

impl Settings {
    /// Validate everything, log each problem, and fail on the first.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, RebalancerError> {
        let mut problems = validate_config(config);
        if !problems.is_empty() {
            for problem in &problems {
                error!(%problem, "invalid configuration");
            }
            return Err(problems.remove(0));
        }

        let strategies = strategy_keys(config)
            .iter()
            .map(|key| strategy_spec(config, key))
            .collect::<Result<Vec<_>, _>>()?;

        let source = config
            .get_string(DATA, "source")
            .and_then(|s| DataSource::parse(&s))
            .unwrap_or(DataSource::Csv);
        let path = config
            .get_string(DATA, "path")
            .ok_or_else(|| RebalancerError::missing(DATA, "path"))?;

        Ok(Settings {
            name: config
                .get_string(PORTFOLIO, "name")
                .unwrap_or_else(|| "portfolio".to_string()),
            work_dir: PathBuf::from(
                config
                    .get_string(PORTFOLIO, "work_dir")
                    .unwrap_or_else(|| ".".to_string()),
            ),
            initial_balance: config.get_double(PORTFOLIO, "initial_balance", 0.0),
            engine: engine_settings(config),
            strategies,
            data: DataSettings {
                source,
                path: PathBuf::from(path),
                pool_size: config.get_int(DATA, "pool_size", 4).clamp(1, 64) as u32,
            },
            broker_statement: config.get_string(BROKER, "statement").map(PathBuf::from),
        })
    }

    /// `(key, percent)` pairs used to seed a composite portfolio.
    pub fn allocations(&self) -> Vec<(String, f64)> {
        self.strategies
            .iter()
            .map(|s| (s.key.clone(), s.percent))
            .collect()
    }

    pub fn strategy(&self, key: &str) -> Option<&StrategySpec> {
        self.strategies.iter().find(|s| s.key == key)
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.work_dir.join(&self.name)
    }
}

pub fn engine_settings(config: &dyn ConfigPort) -> EngineSettings {
    let defaults = EngineSettings::default();
    EngineSettings {
        leverage: config.get_double(PORTFOLIO, "leverage", defaults.leverage),
        alloc_percent: config.get_double(PORTFOLIO, "alloc_percent", defaults.alloc_percent),
    }
}

/// Strategy keys in run order.
pub fn strategy_keys(config: &dyn ConfigPort) -> Vec<String> {
    config.get_list(PORTFOLIO, "strategies")
}

pub fn strategy_kind(config: &dyn ConfigPort, key: &str) -> Result<StrategyKind, RebalancerError> {
    let section = StrategySpec::section(key);
    let raw = config
        .get_string(&section, "kind")
        .ok_or_else(|| RebalancerError::missing(&section, "kind"))?;
    StrategyKind::parse(&raw).ok_or_else(|| RebalancerError::UnknownStrategy(raw))
}

fn symbol(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config.get_string(section, key).map(|s| s.to_uppercase())
}

fn optional_double(config: &dyn ConfigPort, section: &str, key: &str) -> Option<f64> {
    config
        .get_string(section, key)
        .and_then(|v| v.parse::<f64>().ok())
}

pub fn universe_query(config: &dyn ConfigPort, section: &str) -> UniverseQuery {
    let defaults = UniverseQuery::default();
    let kinds = config.get_list(section, "universe_types");
    UniverseQuery {
        limit: usize_param(config, section, "universe_limit", defaults.limit),
        window_days: config.get_int(section, "universe_window_days", defaults.window_days),
        kinds: if kinds.is_empty() { defaults.kinds } else { kinds },
        min_price: optional_double(config, section, "universe_min_price"),
        max_dollar_volume: optional_double(config, section, "universe_max_dollar_volume"),
    }
}

pub fn universe_source(
    config: &dyn ConfigPort,
    section: &str,
    kind: StrategyKind,
) -> Result<UniverseSource, RebalancerError> {
    let universe = config
        .get_string(section, "universe")
        .map(|u| u.to_lowercase())
        .unwrap_or_else(|| "fixed".to_string());
    match universe.as_str() {
        "fixed" => {
            let symbols = match config.get_string(section, "tickers") {
                Some(raw) => parse_symbols(&raw)
                    .map_err(|e| RebalancerError::invalid(section, "tickers", e.to_string()))?,
                None => kind.default_universe().unwrap_or_default(),
            };
            if symbols.is_empty() {
                return Err(RebalancerError::invalid(section, "tickers", "fixed universe is empty"));
            }
            Ok(UniverseSource::Fixed(symbols))
        }
        "top_dollar_volume" => Ok(UniverseSource::TopDollarVolume(universe_query(config, section))),
        other => Err(RebalancerError::invalid(
            section,
            "universe",
            format!("unknown universe '{other}', expected fixed or top_dollar_volume"),
        )),
    }
}

/// Everything configured under `[strategy.<key>]`.
pub fn strategy_spec(config: &dyn ConfigPort, key: &str) -> Result<StrategySpec, RebalancerError> {
    let section = StrategySpec::section(key);
    let kind = strategy_kind(config, key)?;
    let fallback = symbol(config, &section, "fallback");
    let benchmark = symbol(config, &section, "benchmark");
    if kind.needs_fallback() && fallback.is_none() {
        return Err(RebalancerError::missing(&section, "fallback"));
    }
    if kind.needs_benchmark() && benchmark.is_none() {
        return Err(RebalancerError::missing(&section, "benchmark"));
    }

    Ok(StrategySpec {
        key: key.to_string(),
        kind,
        percent: config.get_double(&section, "percent", 0.0),
        universe: universe_source(config, &section, kind)?,
        fallback,
        benchmark,
        lookback: usize_param(config, &section, "lookback", kind.default_lookback()),
        params: StrategyParams::from_config(kind, config, &section),
    })
}
