//! Rolling sample standard deviation.
//!
//! STDDEV(n)[i] = sqrt(sum((x[i-j] - mean)^2 for j in 0..n) / (n - 1))
//! Warmup: first (n-1) points are undefined.

use crate::domain::indicator::{require, IndicatorError, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::PriceHistory;

pub fn calculate_stddev(series: &[f64], period: usize) -> Result<IndicatorSeries, IndicatorError> {
    let indicator_type = IndicatorType::Stddev(period);
    require(indicator_type, period, series.len(), period.max(2))?;
    if period < 2 {
        return Err(IndicatorError::PeriodTooShort {
            indicator: indicator_type,
            min: 2,
        });
    }

    let values = (0..series.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            let window = &series[i + 1 - period..=i];
            let mean = window.iter().sum::<f64>() / period as f64;
            let variance = window
                .iter()
                .map(|v| {
                    let diff = v - mean;
                    diff * diff
                })
                .sum::<f64>()
                / (period as f64 - 1.0);
            Some(variance.sqrt())
        })
        .collect();

    Ok(IndicatorSeries {
        indicator_type,
        values,
    })
}

/// Standard deviation of the last `window` bar-over-bar close ratios.
pub fn return_volatility(history: &PriceHistory, window: usize) -> Result<f64, IndicatorError> {
    let series = calculate_stddev(&history.daily_ratios(), window)?;
    series.last().ok_or(IndicatorError::InsufficientData {
        indicator: IndicatorType::Stddev(window),
        have: history.len().saturating_sub(1),
        need: window,
    })
}
