//! Average True Range.
//!
//! TR[0] = high - low, TR[i] = max(high - low, |high - prev_close|, |low - prev_close|).
//! ATR is either the trailing mean of TR over n bars, or its exponential mean
//! with span n (`alpha = 2/(n+1)`). Warmup: the first n-1 bars are undefined.

use crate::domain::indicator::{
    exponential_mean, require, IndicatorError, IndicatorSeries, IndicatorType,
};
use crate::domain::ohlcv::OhlcvBar;

pub fn true_ranges(bars: &[OhlcvBar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                bar.range()
            } else {
                bar.true_range(bars[i - 1].close)
            }
        })
        .collect()
}

pub fn calculate_atr(
    bars: &[OhlcvBar],
    period: usize,
    use_ema: bool,
) -> Result<IndicatorSeries, IndicatorError> {
    let indicator_type = IndicatorType::Atr {
        period,
        ema: use_ema,
    };
    require(indicator_type, period, bars.len(), period)?;

    let tr = true_ranges(bars);
    let values = if use_ema {
        exponential_mean(&tr, 2.0 / (period as f64 + 1.0), period)
    } else {
        let mut out = Vec::with_capacity(tr.len());
        let mut sum = 0.0;
        for i in 0..tr.len() {
            sum += tr[i];
            if i >= period {
                sum -= tr[i - period];
            }
            out.push(if i + 1 >= period {
                Some(sum / period as f64)
            } else {
                None
            });
        }
        out
    };

    Ok(IndicatorSeries {
        indicator_type,
        values,
    })
}
