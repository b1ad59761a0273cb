//! RSI (Relative Strength Index) indicator implementation.
//!
//! Gains and losses are bar-over-bar deltas (the first delta counts as zero),
//! each smoothed with an exponential mean of decay `alpha = 1/n` seeded with
//! the first value (Wilder smoothing):
//! - avg[i] = alpha * x[i] + (1 - alpha) * avg[i-1]
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0 and avg_gain > 0: RSI = 100 (saturated)
//! If both averages are zero the value is undefined.
//!
//! Warmup: the first n-1 points are undefined.

use crate::domain::indicator::{
    exponential_mean, require, IndicatorError, IndicatorSeries, IndicatorType,
};

pub fn calculate_rsi(series: &[f64], period: usize) -> Result<IndicatorSeries, IndicatorError> {
    let indicator_type = IndicatorType::Rsi(period);
    require(indicator_type, period, series.len(), period + 1)?;

    let mut gains = Vec::with_capacity(series.len());
    let mut losses = Vec::with_capacity(series.len());
    gains.push(0.0);
    losses.push(0.0);
    for w in series.windows(2) {
        let change = w[1] - w[0];
        gains.push(if change > 0.0 { change } else { 0.0 });
        losses.push(if change < 0.0 { -change } else { 0.0 });
    }

    let alpha = 1.0 / period as f64;
    let avg_gains = exponential_mean(&gains, alpha, period);
    let avg_losses = exponential_mean(&losses, alpha, period);

    let values = avg_gains
        .into_iter()
        .zip(avg_losses)
        .map(|(gain, loss)| match (gain, loss) {
            (Some(g), Some(l)) => rsi_value(g, l),
            _ => None,
        })
        .collect();

    Ok(IndicatorSeries {
        indicator_type,
        values,
    })
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            return None;
        }
        return Some(100.0);
    }
    Some(100.0 - (100.0 / (1.0 + avg_gain / avg_loss)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rsi_warmup_period() {
        let closes: Vec<f64> = (1..=15).map(|i| 100.0 + (i as f64 % 5.0) * 2.0).collect();
        let series = calculate_rsi(&closes, 14).unwrap();

        assert_eq!(series.values.len(), 15);
        for i in 0..13 {
            assert!(series.values[i].is_none(), "point {} should be undefined", i);
        }
        assert!(series.values[13].is_some());
    }

    #[test]
    fn rsi_all_gains_saturates_at_100() {
        let closes: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        let series = calculate_rsi(&closes, 14).unwrap();
        assert!((series.last().unwrap() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_all_losses_is_zero() {
        let closes: Vec<f64> = (0..15).map(|i| 100.0 - i as f64).collect();
        let series = calculate_rsi(&closes, 14).unwrap();
        assert!((series.last().unwrap() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_flat_series_is_undefined() {
        let series = calculate_rsi(&[10.0; 6], 2).unwrap();
        assert!(series.values.iter().all(Option::is_none));
    }

    #[test]
    fn rsi_period_two_known_values() {
        // deltas: 0, +1, -2, +1 ; alpha = 0.5
        // gains: 0, 1, 0, 1 -> ewm: 0, 0.5, 0.25, 0.625
        // losses: 0, 0, 2, 0 -> ewm: 0, 0, 1.0, 0.5
        let series = calculate_rsi(&[10.0, 11.0, 9.0, 10.0], 2).unwrap();
        assert_eq!(series.values[0], None);
        assert!((series.values[1].unwrap() - 100.0).abs() < 1e-12);
        assert!((series.values[2].unwrap() - 20.0).abs() < 1e-12);
        assert!((series.values[3].unwrap() - (100.0 - 100.0 / 2.25)).abs() < 1e-12);
    }

    #[test]
    fn rsi_requires_period_plus_one_points() {
        let err = calculate_rsi(&[1.0, 2.0], 2).unwrap_err();
        assert_eq!(
            err,
            IndicatorError::InsufficientData {
                indicator: IndicatorType::Rsi(2),
                have: 2,
                need: 3
            }
        );
    }

    proptest! {
        #[test]
        fn rsi_stays_within_bounds(closes in prop::collection::vec(1.0f64..500.0, 3..80)) {
            let series = calculate_rsi(&closes, 2).unwrap();
            for v in series.values.iter().flatten() {
                prop_assert!(*v >= 0.0 && *v <= 100.0);
            }
        }

        #[test]
        fn rsi_monotonic_increase_converges_to_100(start in 1.0f64..100.0, step in 0.01f64..5.0, len in 4usize..60) {
            let closes: Vec<f64> = (0..len).map(|i| start + step * i as f64).collect();
            let series = calculate_rsi(&closes, 3).unwrap();
            prop_assert!((series.last().unwrap() - 100.0).abs() < 1e-9);
        }

        #[test]
        fn rsi_monotonic_decrease_converges_to_0(start in 500.0f64..1000.0, step in 0.01f64..5.0, len in 4usize..60) {
            let closes: Vec<f64> = (0..len).map(|i| start - step * i as f64).collect();
            let series = calculate_rsi(&closes, 3).unwrap();
            prop_assert!(series.last().unwrap().abs() < 1e-9);
        }
    }
}
