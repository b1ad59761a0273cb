//! Technical indicator implementations.
//!
//! All indicators are pure functions over index-aligned `f64` slices:
//! - `IndicatorType`: indicator identity + parameters
//! - `IndicatorSeries`: one optional value per input point (`None` during warmup)
//! - `IndicatorError`: returned instead of silently truncating short inputs
//!
//! Callers treat `IndicatorError::InsufficientData` as "skip this instrument
//! today", never as a fatal error.

pub mod adx;
pub mod atr;
pub mod connors;
pub mod rsi;
pub mod sma;
pub mod stddev;

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Rsi(usize),
    ConnorsRsi {
        rsi_period: usize,
        streak_period: usize,
        rank_window: usize,
    },
    PercentRank(usize),
    Atr {
        period: usize,
        ema: bool,
    },
    Adx(usize),
    Stddev(usize),
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::ConnorsRsi {
                rsi_period,
                streak_period,
                rank_window,
            } => write!(f, "CRSI({},{},{})", rsi_period, streak_period, rank_window),
            IndicatorType::PercentRank(window) => write!(f, "PERCENTRANK({})", window),
            IndicatorType::Atr { period, ema: false } => write!(f, "ATR({})", period),
            IndicatorType::Atr { period, ema: true } => write!(f, "ATR({},EMA)", period),
            IndicatorType::Adx(period) => write!(f, "ADX({})", period),
            IndicatorType::Stddev(period) => write!(f, "STDDEV({})", period),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndicatorError {
    #[error("{indicator} needs at least {need} points, have {have}")]
    InsufficientData {
        indicator: IndicatorType,
        have: usize,
        need: usize,
    },

    #[error("{0} has a zero period")]
    ZeroPeriod(IndicatorType),

    #[error("{indicator} needs a period of at least {min}")]
    PeriodTooShort { indicator: IndicatorType, min: usize },

    #[error("{indicator} inputs differ in length")]
    MismatchedInputs { indicator: IndicatorType },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<Option<f64>>,
}

impl IndicatorSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Latest value, `None` when still warming up or undefined.
    pub fn last(&self) -> Option<f64> {
        self.values.last().copied().flatten()
    }

    /// Value `n` points before the latest; `back(0) == last()`.
    pub fn back(&self, n: usize) -> Option<f64> {
        let len = self.values.len();
        if n >= len {
            return None;
        }
        self.values[len - 1 - n]
    }
}

/// Fail with `InsufficientData` or `ZeroPeriod` before computing anything.
pub(crate) fn require(
    indicator: IndicatorType,
    period: usize,
    have: usize,
    need: usize,
) -> Result<(), IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::ZeroPeriod(indicator));
    }
    if have < need {
        return Err(IndicatorError::InsufficientData {
            indicator,
            have,
            need,
        });
    }
    Ok(())
}

/// Exponential mean with `alpha`, seeded with the first value and valid from
/// index `min_periods - 1` onwards.
pub(crate) fn exponential_mean(values: &[f64], alpha: f64, min_periods: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    let mut average = 0.0;
    for (i, &v) in values.iter().enumerate() {
        average = if i == 0 {
            v
        } else {
            alpha * v + (1.0 - alpha) * average
        };
        out.push(if i + 1 >= min_periods { Some(average) } else { None });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_type_display() {
        assert_eq!(IndicatorType::Sma(20).to_string(), "SMA(20)");
        assert_eq!(
            IndicatorType::ConnorsRsi {
                rsi_period: 3,
                streak_period: 2,
                rank_window: 100
            }
            .to_string(),
            "CRSI(3,2,100)"
        );
        assert_eq!(
            IndicatorType::Atr {
                period: 14,
                ema: true
            }
            .to_string(),
            "ATR(14,EMA)"
        );
    }

    #[test]
    fn insufficient_data_message() {
        let err = require(IndicatorType::Rsi(14), 14, 5, 15).unwrap_err();
        assert_eq!(err.to_string(), "RSI(14) needs at least 15 points, have 5");
    }

    #[test]
    fn zero_period_rejected_first() {
        let err = require(IndicatorType::Sma(0), 0, 0, 0).unwrap_err();
        assert_eq!(err, IndicatorError::ZeroPeriod(IndicatorType::Sma(0)));
    }

    #[test]
    fn series_back_and_last() {
        let series = IndicatorSeries {
            indicator_type: IndicatorType::Sma(2),
            values: vec![None, Some(1.0), Some(2.0)],
        };
        assert_eq!(series.last(), Some(2.0));
        assert_eq!(series.back(1), Some(1.0));
        assert_eq!(series.back(2), None);
        assert_eq!(series.back(3), None);
    }

    #[test]
    fn exponential_mean_respects_min_periods() {
        let out = exponential_mean(&[1.0, 3.0, 5.0], 0.5, 2);
        assert_eq!(out, vec![None, Some(2.0), Some(3.5)]);
    }
}
