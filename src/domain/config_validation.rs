//! Configuration validation.
//!
//! Every check runs and every problem is returned, so an operator fixes the
//! whole file in one pass.

use std::collections::BTreeSet;

use crate::domain::composite::RESERVED_KEYS;
use crate::domain::error::RebalancerError;
use crate::domain::settings::{
    strategy_keys, strategy_kind, universe_source, DataSource, DATA, PORTFOLIO,
};
use crate::domain::strategy::{StrategySpec, BARS_PER_MONTH};
use crate::ports::config_port::ConfigPort;

pub fn validate_config(config: &dyn ConfigPort) -> Vec<RebalancerError> {
    let mut problems = Vec::new();
    validate_portfolio(config, &mut problems);
    validate_data(config, &mut problems);
    validate_strategies(config, &mut problems);
    problems
}

fn validate_portfolio(config: &dyn ConfigPort, problems: &mut Vec<RebalancerError>) {
    if config.get_string(PORTFOLIO, "initial_balance").is_none() {
        problems.push(RebalancerError::missing(PORTFOLIO, "initial_balance"));
    } else if config.get_double(PORTFOLIO, "initial_balance", 0.0) <= 0.0 {
        problems.push(RebalancerError::invalid(
            PORTFOLIO,
            "initial_balance",
            "initial_balance must be a positive number",
        ));
    }

    if config.get_double(PORTFOLIO, "leverage", 1.0) <= 0.0 {
        problems.push(RebalancerError::invalid(
            PORTFOLIO,
            "leverage",
            "leverage must be positive",
        ));
    }

    let alloc = config.get_double(PORTFOLIO, "alloc_percent", 99.5);
    if alloc <= 0.0 || alloc > 100.0 {
        problems.push(RebalancerError::invalid(
            PORTFOLIO,
            "alloc_percent",
            "alloc_percent must be in (0, 100]",
        ));
    }
}

fn validate_data(config: &dyn ConfigPort, problems: &mut Vec<RebalancerError>) {
    if let Some(source) = config.get_string(DATA, "source") {
        if DataSource::parse(&source).is_none() {
            problems.push(RebalancerError::invalid(
                DATA,
                "source",
                format!("unknown data source '{source}', expected csv or sqlite"),
            ));
        }
    }
    if config.get_string(DATA, "path").is_none() {
        problems.push(RebalancerError::missing(DATA, "path"));
    }
}

fn validate_strategies(config: &dyn ConfigPort, problems: &mut Vec<RebalancerError>) {
    let keys = strategy_keys(config);
    if keys.is_empty() {
        problems.push(RebalancerError::missing(PORTFOLIO, "strategies"));
        return;
    }

    let mut seen = BTreeSet::new();
    let mut total_percent = 0.0;
    for key in &keys {
        let section = StrategySpec::section(key);
        if RESERVED_KEYS.contains(&key.to_lowercase().as_str()) {
            problems.push(RebalancerError::invalid(
                PORTFOLIO,
                "strategies",
                format!("'{key}' is a reserved snapshot key"),
            ));
        }
        if !seen.insert(key.clone()) {
            problems.push(RebalancerError::invalid(
                PORTFOLIO,
                "strategies",
                format!("'{key}' is listed twice"),
            ));
            continue;
        }

        let percent = config.get_double(&section, "percent", 0.0);
        if percent <= 0.0 {
            problems.push(RebalancerError::invalid(
                &section,
                "percent",
                "percent must be positive",
            ));
        }
        total_percent += percent;

        let kind = match strategy_kind(config, key) {
            Ok(kind) => kind,
            Err(RebalancerError::UnknownStrategy(raw)) => {
                problems.push(RebalancerError::invalid(
                    &section,
                    "kind",
                    format!("unknown strategy kind '{raw}'"),
                ));
                continue;
            }
            Err(err) => {
                problems.push(err);
                continue;
            }
        };
        if kind.needs_fallback() && config.get_string(&section, "fallback").is_none() {
            problems.push(RebalancerError::missing(&section, "fallback"));
        }
        if kind.needs_benchmark() && config.get_string(&section, "benchmark").is_none() {
            problems.push(RebalancerError::missing(&section, "benchmark"));
        }
        if let Err(err) = universe_source(config, &section, kind) {
            problems.push(err);
        }
        validate_windows(config, &section, problems);
    }

    if total_percent > 100.0 + 1e-9 {
        problems.push(RebalancerError::invalid(
            PORTFOLIO,
            "strategies",
            format!("strategy percentages sum to {total_percent}, more than 100"),
        ));
    }
}

/// Window and horizon parameters shared by several strategy kinds.
fn validate_windows(config: &dyn ConfigPort, section: &str, problems: &mut Vec<RebalancerError>) {
    if config.get_string(section, "volatility_window").is_some()
        && config.get_int(section, "volatility_window", 0) < 2
    {
        problems.push(RebalancerError::invalid(
            section,
            "volatility_window",
            "volatility_window must be at least 2",
        ));
    }

    let months: Vec<String> = config.get_list(section, "months");
    for raw in &months {
        let fits = raw
            .parse::<usize>()
            .ok()
            .and_then(|m| BARS_PER_MONTH.checked_mul(m))
            .is_some();
        if !fits {
            problems.push(RebalancerError::invalid(
                section,
                "months",
                format!("month horizon '{raw}' is out of range"),
            ));
        }
    }
}
