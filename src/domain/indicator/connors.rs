//! ConnorsRSI: mean of price RSI, streak RSI and the percent rank of the
//! latest one-bar return.
//!
//! - streak: +1/-1 on a direction change, extended while the direction
//!   persists, 0 on an unchanged close
//! - percent rank: average rank of the latest percent change within the
//!   trailing `rank_window` changes, divided by the window and scaled to 0..100;
//!   undefined until the window holds `rank_window` changes

use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::indicator::{require, IndicatorError, IndicatorSeries, IndicatorType};

pub const DEFAULT_RSI_PERIOD: usize = 3;
pub const DEFAULT_STREAK_PERIOD: usize = 2;
pub const DEFAULT_RANK_WINDOW: usize = 100;

/// Consecutive up/down close count.
pub fn updown_streak(closes: &[f64]) -> Vec<f64> {
    let mut streak = Vec::with_capacity(closes.len());
    let mut current = 0.0_f64;
    for (i, &close) in closes.iter().enumerate() {
        if i > 0 {
            let prev = closes[i - 1];
            current = if close > prev {
                if current > 0.0 { current + 1.0 } else { 1.0 }
            } else if close < prev {
                if current < 0.0 { current - 1.0 } else { -1.0 }
            } else {
                0.0
            };
        }
        streak.push(current);
    }
    streak
}

/// Percent change in percent points; the first point is undefined.
pub fn percent_change(closes: &[f64]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(closes.len());
    out.push(None);
    for w in closes.windows(2) {
        out.push(if w[0] == 0.0 {
            None
        } else {
            Some((w[1] / w[0] - 1.0) * 100.0)
        });
    }
    out.truncate(closes.len());
    out
}

/// Rolling average-rank percentile (0..=100) of each point within its window.
pub fn percent_rank(values: &[Option<f64>], window: usize) -> Result<IndicatorSeries, IndicatorError> {
    let indicator_type = IndicatorType::PercentRank(window);
    require(indicator_type, window, values.len(), window)?;

    let mut out = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        if i + 1 < window {
            out.push(None);
            continue;
        }
        let slice = &values[i + 1 - window..=i];
        let defined: Option<Vec<f64>> = slice.iter().copied().collect();
        out.push(defined.and_then(|w| {
            let latest = *w.last()?;
            let below = w.iter().filter(|&&v| v < latest).count() as f64;
            let equal = w.iter().filter(|&&v| v == latest).count() as f64;
            let rank = below + (equal + 1.0) / 2.0;
            Some(rank / window as f64 * 100.0)
        }));
    }

    Ok(IndicatorSeries {
        indicator_type,
        values: out,
    })
}

pub fn calculate_connors_rsi(
    closes: &[f64],
    rsi_period: usize,
    streak_period: usize,
    rank_window: usize,
) -> Result<IndicatorSeries, IndicatorError> {
    let indicator_type = IndicatorType::ConnorsRsi {
        rsi_period,
        streak_period,
        rank_window,
    };
    let need = (rank_window + 1).max(rsi_period + 1).max(streak_period + 1);
    require(
        indicator_type,
        rsi_period.min(streak_period).min(rank_window),
        closes.len(),
        need,
    )?;

    let price_rsi = calculate_rsi(closes, rsi_period)?;
    let streak_rsi = calculate_rsi(&updown_streak(closes), streak_period)?;
    let rank = percent_rank(&percent_change(closes), rank_window)?;

    let values = (0..closes.len())
        .map(|i| match (price_rsi.values[i], streak_rsi.values[i], rank.values[i]) {
            (Some(a), Some(b), Some(c)) => Some((a + b + c) / 3.0),
            _ => None,
        })
        .collect();

    Ok(IndicatorSeries {
        indicator_type,
        values,
    })
}
