#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
pub use rebalancer::domain::ohlcv::OhlcvBar;
use rebalancer::domain::composite::CompositePortfolio;
use rebalancer::domain::error::RebalancerError;
use rebalancer::domain::universe::UniverseQuery;
use rebalancer::ports::broker_port::{BrokerPort, BrokerPosition, Side};
use rebalancer::ports::data_port::DataPort;
use rebalancer::ports::snapshot_port::SnapshotPort;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    /// One calendar-day bar per close, the last one on the day before `until`.
    pub fn with_closes(self, symbol: &str, until: NaiveDate, closes: &[f64]) -> Self {
        self.with_bars(symbol, make_bars(symbol, until, closes))
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_series(
        &self,
        symbol: &str,
        before: NaiveDate,
        lookback: usize,
    ) -> Result<Vec<OhlcvBar>, RebalancerError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(RebalancerError::Database {
                reason: reason.clone(),
            });
        }
        let bars: Vec<OhlcvBar> = self
            .data
            .get(symbol)
            .map(|b| b.iter().filter(|bar| bar.date < before).cloned().collect())
            .unwrap_or_default();
        let skip = bars.len().saturating_sub(lookback);
        Ok(bars.into_iter().skip(skip).collect())
    }

    fn rank_by_dollar_volume(
        &self,
        query: &UniverseQuery,
        _as_of: NaiveDate,
    ) -> Result<Vec<String>, RebalancerError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        symbols.truncate(query.limit);
        Ok(symbols)
    }

    fn list_symbols(&self) -> Result<Vec<String>, RebalancerError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

/// Snapshot store kept in memory; `saved` records every name written, in order.
#[derive(Default)]
pub struct MemorySnapshots {
    pub files: RefCell<BTreeMap<String, CompositePortfolio>>,
    pub saved: RefCell<Vec<String>>,
    pub log: RefCell<Vec<String>>,
    pub log_fails: bool,
}

impl MemorySnapshots {
    /// A store whose transition log cannot be written.
    pub fn with_broken_log() -> Self {
        MemorySnapshots {
            log_fails: true,
            ..Self::default()
        }
    }

    pub fn with(self, name: &str, portfolio: CompositePortfolio) -> Self {
        self.files.borrow_mut().insert(name.to_string(), portfolio);
        self
    }

    pub fn get(&self, name: &str) -> Option<CompositePortfolio> {
        self.files.borrow().get(name).cloned()
    }
}

impl SnapshotPort for MemorySnapshots {
    fn load(&self, date: NaiveDate) -> Result<Option<CompositePortfolio>, RebalancerError> {
        Ok(self.get(&date.to_string()))
    }

    fn latest_date(&self, on_or_before: NaiveDate) -> Result<Option<NaiveDate>, RebalancerError> {
        Ok(self
            .files
            .borrow()
            .keys()
            .filter_map(|name| NaiveDate::parse_from_str(name, "%Y-%m-%d").ok())
            .filter(|d| *d <= on_or_before)
            .max())
    }

    fn save(&self, name: &str, portfolio: &CompositePortfolio) -> Result<(), RebalancerError> {
        self.files
            .borrow_mut()
            .insert(name.to_string(), portfolio.clone());
        self.saved.borrow_mut().push(name.to_string());
        Ok(())
    }

    fn append_log(&self, text: &str) -> Result<(), RebalancerError> {
        if self.log_fails {
            return Err(std::io::Error::other("log is read-only").into());
        }
        self.log.borrow_mut().push(text.to_string());
        Ok(())
    }
}

pub struct MockBroker {
    pub positions: BTreeMap<String, BrokerPosition>,
    pub cash: f64,
    pub equity: f64,
}

impl MockBroker {
    pub fn new(cash: f64, equity: f64) -> Self {
        Self {
            positions: BTreeMap::new(),
            cash,
            equity,
        }
    }

    pub fn holding(mut self, symbol: &str, quantity: f64, entry: f64, last: f64) -> Self {
        let side = if quantity < 0.0 { Side::Sell } else { Side::Buy };
        self.positions.insert(
            symbol.to_string(),
            BrokerPosition {
                side,
                quantity: quantity.abs(),
                entry_price: entry,
                last_price: last,
            },
        );
        self
    }
}

impl BrokerPort for MockBroker {
    fn positions(&self) -> Result<BTreeMap<String, BrokerPosition>, RebalancerError> {
        Ok(self.positions.clone())
    }

    fn cash(&self) -> Result<f64, RebalancerError> {
        Ok(self.cash)
    }

    fn equity(&self) -> Result<f64, RebalancerError> {
        Ok(self.equity)
    }
}

pub fn make_bar(symbol: &str, date: NaiveDate, close: f64) -> OhlcvBar {
    OhlcvBar {
        symbol: symbol.to_string(),
        date,
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume: 1_000_000.0,
    }
}

/// Consecutive calendar-day bars, the last one on the day before `until`.
pub fn make_bars(symbol: &str, until: NaiveDate, closes: &[f64]) -> Vec<OhlcvBar> {
    let n = closes.len() as i64;
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| make_bar(symbol, until - Duration::days(n - i as i64), close))
        .collect()
}

/// A steady climb with alternating step sizes, so return volatility is non-zero.
pub fn rising(start: f64, step: f64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| start + step * i as f64 + if i % 2 == 0 { 0.0 } else { step / 2.0 })
        .collect()
}

pub fn flat(price: f64, n: usize) -> Vec<f64> {
    vec![price; n]
}

/// `date,open,high,low,close,volume` CSV text for `bars`.
pub fn to_csv(bars: &[OhlcvBar]) -> String {
    let mut out = String::from("date,open,high,low,close,volume\n");
    for bar in bars {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            bar.date, bar.open, bar.high, bar.low, bar.close, bar.volume
        ));
    }
    out
}
