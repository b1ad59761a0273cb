//! SQLite price store behind an r2d2 connection pool.
//!
//! Bars live in `ohlcv`; `instruments` carries the kind and disabled flag
//! the dollar-volume universe filters on.

use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;
use tracing::debug;

use crate::domain::calendar::start_of_month;
use crate::domain::error::RebalancerError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::universe::{rank_dollar_volume, DollarVolume, UniverseQuery};
use crate::ports::data_port::DataPort;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn query_error(e: rusqlite::Error) -> RebalancerError {
    RebalancerError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn parse_date(text: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(text.len(), rusqlite::types::Type::Text, Box::new(e))
    })
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn open(path: &Path, pool_size: u32) -> Result<Self, RebalancerError> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(|e: r2d2::Error| RebalancerError::Database {
                reason: format!("{}: {e}", path.display()),
            })?;
        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, RebalancerError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| RebalancerError::Database {
                reason: e.to_string(),
            })?;
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, RebalancerError> {
        self.pool.get().map_err(|e: r2d2::Error| RebalancerError::Database {
            reason: e.to_string(),
        })
    }

    pub fn initialize_schema(&self) -> Result<(), RebalancerError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS ohlcv (
                    symbol TEXT NOT NULL,
                    date TEXT NOT NULL,
                    open REAL NOT NULL,
                    high REAL NOT NULL,
                    low REAL NOT NULL,
                    close REAL NOT NULL,
                    volume REAL NOT NULL,
                    PRIMARY KEY (symbol, date)
                );
                CREATE INDEX IF NOT EXISTS idx_ohlcv_date ON ohlcv(date);
                CREATE TABLE IF NOT EXISTS instruments (
                    symbol TEXT PRIMARY KEY,
                    kind TEXT NOT NULL,
                    disabled INTEGER NOT NULL DEFAULT 0
                );",
            )
            .map_err(query_error)
    }

    pub fn insert_bars(&self, bars: &[OhlcvBar]) -> Result<(), RebalancerError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO ohlcv (symbol, date, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    bar.symbol,
                    bar.date.format(DATE_FORMAT).to_string(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ],
            )
            .map_err(query_error)?;
        }
        tx.commit().map_err(query_error)
    }

    pub fn upsert_instrument(
        &self,
        symbol: &str,
        kind: &str,
        disabled: bool,
    ) -> Result<(), RebalancerError> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO instruments (symbol, kind, disabled) VALUES (?1, ?2, ?3)",
                params![symbol, kind, disabled],
            )
            .map_err(query_error)?;
        Ok(())
    }
}

impl DataPort for SqliteAdapter {
    fn fetch_series(
        &self,
        symbol: &str,
        before: NaiveDate,
        lookback: usize,
    ) -> Result<Vec<OhlcvBar>, RebalancerError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT date, open, high, low, close, volume
                 FROM ohlcv
                 WHERE symbol = ?1 AND date < ?2
                 ORDER BY date DESC
                 LIMIT ?3",
            )
            .map_err(query_error)?;

        let limit = i64::try_from(lookback).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(
                params![symbol, before.format(DATE_FORMAT).to_string(), limit],
                |row| {
                    Ok(OhlcvBar {
                        symbol: symbol.to_string(),
                        date: parse_date(row.get(0)?)?,
                        open: row.get(1)?,
                        high: row.get(2)?,
                        low: row.get(3)?,
                        close: row.get(4)?,
                        volume: row.get(5)?,
                    })
                },
            )
            .map_err(query_error)?;

        let mut bars = rows.collect::<Result<Vec<_>, _>>().map_err(query_error)?;
        bars.reverse();
        Ok(bars)
    }

    fn rank_by_dollar_volume(
        &self,
        query: &UniverseQuery,
        as_of: NaiveDate,
    ) -> Result<Vec<String>, RebalancerError> {
        let from = query.window_start(as_of).format(DATE_FORMAT).to_string();
        let until = start_of_month(as_of).format(DATE_FORMAT).to_string();

        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT o.symbol, i.kind, AVG(o.close * o.volume),
                        (SELECT l.close FROM ohlcv l
                          WHERE l.symbol = o.symbol AND l.date < ?2
                          ORDER BY l.date DESC LIMIT 1)
                 FROM ohlcv o
                 JOIN instruments i ON i.symbol = o.symbol
                 WHERE i.disabled = 0 AND o.date >= ?1 AND o.date < ?2
                 GROUP BY o.symbol, i.kind",
            )
            .map_err(query_error)?;

        let rows = stmt
            .query_map(params![from, until], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })
            .map_err(query_error)?;

        let mut stats = Vec::new();
        for row in rows {
            let (symbol, kind, average, last_close) = row.map_err(query_error)?;
            if query.kinds.is_empty() || query.kinds.iter().any(|k| k.eq_ignore_ascii_case(&kind)) {
                stats.push(DollarVolume {
                    symbol,
                    average,
                    last_close,
                });
            }
        }
        debug!(from = %from, until = %until, eligible = stats.len(), "dollar volume ranking");
        Ok(rank_dollar_volume(stats, query))
    }

    fn list_symbols(&self) -> Result<Vec<String>, RebalancerError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT symbol FROM ohlcv ORDER BY symbol")
            .map_err(query_error)?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(query_error)?;
        rows.collect::<Result<Vec<String>, _>>().map_err(query_error)
    }
}
