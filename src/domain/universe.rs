//! Strategy instrument universes: fixed lists or a dollar-volume query.

use chrono::{Duration, NaiveDate};
use std::collections::HashSet;

use crate::domain::calendar::start_of_month;
use crate::domain::error::RebalancerError;
use crate::ports::data_port::DataPort;

#[derive(Debug, Clone, PartialEq)]
pub struct UniverseQuery {
    pub limit: usize,
    /// Calendar days counted back from the first of the current month.
    pub window_days: i64,
    pub kinds: Vec<String>,
    pub min_price: Option<f64>,
    pub max_dollar_volume: Option<f64>,
}

impl Default for UniverseQuery {
    fn default() -> Self {
        UniverseQuery {
            limit: 500,
            window_days: 200,
            kinds: vec!["CS".to_string(), "ADRC".to_string()],
            min_price: None,
            max_dollar_volume: None,
        }
    }
}

impl UniverseQuery {
    /// First date of the averaging window for a run on `as_of`.
    pub fn window_start(&self, as_of: NaiveDate) -> NaiveDate {
        start_of_month(as_of) - Duration::days(self.window_days)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UniverseSource {
    Fixed(Vec<String>),
    TopDollarVolume(UniverseQuery),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),
}

/// Parse a comma-separated symbol list, upper-casing and rejecting duplicates.
pub fn parse_symbols(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(UniverseError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

/// Average dollar volume of one instrument over a query window.
#[derive(Debug, Clone, PartialEq)]
pub struct DollarVolume {
    pub symbol: String,
    pub average: f64,
    pub last_close: f64,
}

/// Apply the query's price and volume bounds, then keep the top `limit`.
///
/// Ties are broken by symbol so the ranking is deterministic.
pub fn rank_dollar_volume(mut stats: Vec<DollarVolume>, query: &UniverseQuery) -> Vec<String> {
    stats.retain(|s| {
        query.min_price.is_none_or(|min| s.last_close >= min)
            && query.max_dollar_volume.is_none_or(|max| s.average <= max)
    });
    stats.sort_by(|a, b| {
        b.average
            .partial_cmp(&a.average)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    stats
        .into_iter()
        .take(query.limit)
        .map(|s| s.symbol)
        .collect()
}

/// Ordered symbol list for a run on `as_of`.
pub fn resolve_universe(
    source: &UniverseSource,
    data_port: &dyn DataPort,
    as_of: NaiveDate,
) -> Result<Vec<String>, RebalancerError> {
    match source {
        UniverseSource::Fixed(symbols) => Ok(symbols.clone()),
        UniverseSource::TopDollarVolume(query) => data_port.rank_by_dollar_volume(query, as_of),
    }
}
