//! Simple moving average.
//!
//! SMA(n)[i] = mean(x[i-n+1..=i]); the first n-1 points are undefined.

use crate::domain::indicator::{require, IndicatorError, IndicatorSeries, IndicatorType};

pub fn calculate_sma(series: &[f64], period: usize) -> Result<IndicatorSeries, IndicatorError> {
    let indicator_type = IndicatorType::Sma(period);
    require(indicator_type, period, series.len(), period)?;

    let mut values = Vec::with_capacity(series.len());
    let mut sum = 0.0;
    for (i, &v) in series.iter().enumerate() {
        sum += v;
        if i >= period {
            sum -= series[i - period];
        }
        values.push(if i + 1 >= period {
            Some(sum / period as f64)
        } else {
            None
        });
    }

    Ok(IndicatorSeries {
        indicator_type,
        values,
    })
}
