//! Price history and universe query port trait.

use crate::domain::error::RebalancerError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::universe::UniverseQuery;
use chrono::NaiveDate;

pub trait DataPort {
    /// The latest `lookback` bars strictly before `before`, ascending by date.
    ///
    /// Returns fewer bars (possibly none) when the history is shorter; the
    /// caller decides whether that is enough.
    fn fetch_series(
        &self,
        symbol: &str,
        before: NaiveDate,
        lookback: usize,
    ) -> Result<Vec<OhlcvBar>, RebalancerError>;

    /// Eligible symbols ranked by average dollar volume over the query window.
    fn rank_by_dollar_volume(
        &self,
        query: &UniverseQuery,
        as_of: NaiveDate,
    ) -> Result<Vec<String>, RebalancerError>;

    fn list_symbols(&self) -> Result<Vec<String>, RebalancerError>;
}
