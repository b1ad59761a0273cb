//! Calendar resampling of daily closes (last close per period).
//!
//! Weeks end on Sunday and months on their last calendar day; the trailing,
//! still-open period is included with its latest close.

use chrono::{Datelike, Duration, NaiveDate};

use crate::domain::ohlcv::OhlcvBar;

/// Sunday closing the week that contains `date`.
fn week_end(date: NaiveDate) -> NaiveDate {
    let days_to_sunday = 6 - date.weekday().num_days_from_monday() as i64;
    date + Duration::days(days_to_sunday)
}

fn last_per_period<K: PartialEq>(bars: &[OhlcvBar], key: impl Fn(NaiveDate) -> K) -> Vec<f64> {
    let mut closes: Vec<f64> = Vec::new();
    let mut current: Option<K> = None;
    for bar in bars {
        let k = key(bar.date);
        match current {
            Some(ref c) if *c == k => {
                if let Some(last) = closes.last_mut() {
                    *last = bar.close;
                }
            }
            _ => {
                closes.push(bar.close);
                current = Some(k);
            }
        }
    }
    closes
}

/// Weekly closes from ascending daily bars.
pub fn weekly_closes(bars: &[OhlcvBar]) -> Vec<f64> {
    last_per_period(bars, week_end)
}

/// Monthly closes from ascending daily bars.
pub fn monthly_closes(bars: &[OhlcvBar]) -> Vec<f64> {
    last_per_period(bars, |d| (d.year(), d.month()))
}
