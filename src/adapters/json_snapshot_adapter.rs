//! Daily composite snapshots as pretty, key-sorted JSON files.
//!
//! Layout under the store directory:
//! `{YYYY-MM-DD}.json` per trading day, `{YYYY-MM-DD}_sync.json` for
//! broker reconciliations, and an append-only `transitions.log`.

use chrono::NaiveDate;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::composite::CompositePortfolio;
use crate::domain::error::RebalancerError;
use crate::ports::snapshot_port::SnapshotPort;

const LOG_FILE: &str = "transitions.log";

pub struct JsonSnapshotStore {
    dir: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `{work_dir}/{name}`
    pub fn for_portfolio(work_dir: &Path, name: &str) -> Self {
        Self::new(work_dir.join(name))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Trading-day snapshot dates present in the directory.
    fn snapshot_dates(&self) -> Result<Vec<NaiveDate>, RebalancerError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut dates = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(".json") {
                if let Ok(date) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") {
                    dates.push(date);
                }
            }
        }
        dates.sort();
        Ok(dates)
    }
}

impl SnapshotPort for JsonSnapshotStore {
    fn load(&self, date: NaiveDate) -> Result<Option<CompositePortfolio>, RebalancerError> {
        let path = self.path_for(&date.to_string());
        if !path.exists() {
            debug!(path = %path.display(), "no snapshot");
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        CompositePortfolio::from_json(&text)
            .map(Some)
            .map_err(|e| RebalancerError::MalformedSnapshot {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
    }

    fn latest_date(&self, on_or_before: NaiveDate) -> Result<Option<NaiveDate>, RebalancerError> {
        Ok(self
            .snapshot_dates()?
            .into_iter()
            .filter(|d| *d <= on_or_before)
            .next_back())
    }

    fn save(&self, name: &str, portfolio: &CompositePortfolio) -> Result<(), RebalancerError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(name);
        let tmp = self.dir.join(format!(".{name}.json.tmp"));
        let text = portfolio.to_sorted_json()?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(text.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        info!(path = %path.display(), "snapshot written");
        Ok(())
    }

    fn append_log(&self, text: &str) -> Result<(), RebalancerError> {
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(LOG_FILE))?;
        writeln!(file, "{text}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seeded(day: NaiveDate) -> CompositePortfolio {
        CompositePortfolio::seed(day, 10_000.0, 1.0, &[("mom".to_string(), 100.0)])
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = JsonSnapshotStore::for_portfolio(dir.path(), "paper");
        let day = date(2024, 3, 4);
        store.save(&day.to_string(), &seeded(day)).unwrap();

        assert!(dir.path().join("paper/2024-03-04.json").exists());
        assert!(!dir.path().join("paper/.2024-03-04.json.tmp").exists());
        assert_eq!(store.load(day).unwrap(), Some(seeded(day)));
        assert_eq!(store.load(date(2024, 3, 5)).unwrap(), None);
    }

    #[test]
    fn malformed_snapshot_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = JsonSnapshotStore::new(dir.path());
        fs::write(dir.path().join("2024-03-04.json"), "{ not json").unwrap();
        let err = store.load(date(2024, 3, 4)).unwrap_err();
        assert!(matches!(err, RebalancerError::MalformedSnapshot { .. }));
    }

    #[test]
    fn latest_date_ignores_sync_files_and_later_days() {
        let dir = TempDir::new().unwrap();
        let store = JsonSnapshotStore::new(dir.path());
        for day in [date(2024, 3, 1), date(2024, 3, 4), date(2024, 3, 6)] {
            store.save(&day.to_string(), &seeded(day)).unwrap();
        }
        store.save("2024-03-05_sync", &seeded(date(2024, 3, 5))).unwrap();

        assert_eq!(store.latest_date(date(2024, 3, 5)).unwrap(), Some(date(2024, 3, 4)));
        assert_eq!(store.latest_date(date(2024, 2, 1)).unwrap(), None);
    }

    #[test]
    fn append_log_accumulates() {
        let dir = TempDir::new().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("nested"));
        store.append_log("first").unwrap();
        store.append_log("second").unwrap();
        let text = fs::read_to_string(dir.path().join("nested/transitions.log")).unwrap();
        assert_eq!(text, "first\nsecond\n");
    }
}
