//! CSV price files, one per instrument: `{dir}/{SYMBOL}.csv`.
//!
//! Each file carries a `date,open,high,low,close,volume` header. The
//! directory has no instrument metadata, so the dollar-volume universe
//! ranks every file regardless of the query's instrument kinds.

use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::domain::calendar::start_of_month;
use crate::domain::error::RebalancerError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::universe::{rank_dollar_volume, DollarVolume, UniverseQuery};
use crate::ports::data_port::DataPort;

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }

    /// Every bar in the file, ascending by date.
    fn read_all(&self, symbol: &str) -> Result<Vec<OhlcvBar>, RebalancerError> {
        let path = self.csv_path(symbol);
        if !path.exists() {
            return Err(RebalancerError::NoData {
                symbol: symbol.to_string(),
            });
        }
        let mut reader = csv::Reader::from_path(&path).map_err(|e| RebalancerError::Database {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;

        let mut bars = Vec::new();
        for row in reader.deserialize::<CsvRow>() {
            let row = row.map_err(|e| RebalancerError::DatabaseQuery {
                reason: format!("{}: {e}", path.display()),
            })?;
            bars.push(OhlcvBar {
                symbol: symbol.to_string(),
                date: row.date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }
        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_series(
        &self,
        symbol: &str,
        before: NaiveDate,
        lookback: usize,
    ) -> Result<Vec<OhlcvBar>, RebalancerError> {
        let mut bars = self.read_all(symbol)?;
        bars.retain(|b| b.date < before);
        let skip = bars.len().saturating_sub(lookback);
        Ok(bars.split_off(skip))
    }

    fn rank_by_dollar_volume(
        &self,
        query: &UniverseQuery,
        as_of: NaiveDate,
    ) -> Result<Vec<String>, RebalancerError> {
        let from = query.window_start(as_of);
        let until = start_of_month(as_of);
        let mut stats = Vec::new();
        for symbol in self.list_symbols()? {
            let window: Vec<OhlcvBar> = self
                .read_all(&symbol)?
                .into_iter()
                .filter(|b| b.date >= from && b.date < until)
                .collect();
            let Some(last) = window.last() else {
                continue;
            };
            let average =
                window.iter().map(OhlcvBar::dollar_volume).sum::<f64>() / window.len() as f64;
            stats.push(DollarVolume {
                symbol: symbol.clone(),
                average,
                last_close: last.close,
            });
        }
        debug!(
            from = %from,
            until = %until,
            ranked = stats.len(),
            "dollar volume ranking over csv files"
        );
        Ok(rank_dollar_volume(stats, query))
    }

    fn list_symbols(&self) -> Result<Vec<String>, RebalancerError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| RebalancerError::Database {
            reason: format!(
                "failed to read directory {}: {e}",
                self.base_path.display()
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RebalancerError::Database {
                reason: format!("directory entry error: {e}"),
            })?;
            let name = entry.file_name();
            if let Some(symbol) = name.to_string_lossy().strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }
}
