//! Composite portfolio persistence port trait.

use chrono::NaiveDate;

use crate::domain::composite::CompositePortfolio;
use crate::domain::error::RebalancerError;

pub trait SnapshotPort {
    /// `Ok(None)` when nothing was persisted for `date`; malformed content is an error.
    fn load(&self, date: NaiveDate) -> Result<Option<CompositePortfolio>, RebalancerError>;

    /// Latest persisted trading-day snapshot on or before `date`.
    fn latest_date(&self, on_or_before: NaiveDate) -> Result<Option<NaiveDate>, RebalancerError>;

    /// Persist under `name` (a date, optionally suffixed); all-or-nothing.
    fn save(&self, name: &str, portfolio: &CompositePortfolio) -> Result<(), RebalancerError>;

    fn append_log(&self, text: &str) -> Result<(), RebalancerError>;
}
