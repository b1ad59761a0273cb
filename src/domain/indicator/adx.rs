//! Average Directional Index with +DI/-DI (Wilder).
//!
//! +DM = up move when it exceeds the down move and is positive, else 0 (and
//! symmetrically for -DM). TR, +DM and -DM are Wilder-summed over n bars
//! starting at bar 1; DI = 100 * DM / TR; DX = 100 * |+DI - -DI| / (+DI + -DI).
//! ADX seeds with the mean of the first n DX values, then Wilder-smooths.
//!
//! Warmup: DI is defined from bar n, ADX from bar 2n - 1.

use crate::domain::indicator::atr::true_ranges;
use crate::domain::indicator::{require, IndicatorError, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalIndex {
    pub adx: IndicatorSeries,
    pub plus_di: IndicatorSeries,
    pub minus_di: IndicatorSeries,
}

pub fn calculate_adx(bars: &[OhlcvBar], period: usize) -> Result<DirectionalIndex, IndicatorError> {
    let indicator_type = IndicatorType::Adx(period);
    require(indicator_type, period, bars.len(), 2 * period)?;

    let n = period as f64;
    let tr = true_ranges(bars);
    let mut plus_dm = vec![0.0; bars.len()];
    let mut minus_dm = vec![0.0; bars.len()];
    for i in 1..bars.len() {
        let up = bars[i].high - bars[i - 1].high;
        let down = bars[i - 1].low - bars[i].low;
        if up > down && up > 0.0 {
            plus_dm[i] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[i] = down;
        }
    }

    let mut plus_di = vec![None; bars.len()];
    let mut minus_di = vec![None; bars.len()];
    let mut dx = vec![None; bars.len()];

    let mut s_tr: f64 = tr[1..=period].iter().sum();
    let mut s_plus: f64 = plus_dm[1..=period].iter().sum();
    let mut s_minus: f64 = minus_dm[1..=period].iter().sum();
    for i in period..bars.len() {
        if i > period {
            s_tr = s_tr - s_tr / n + tr[i];
            s_plus = s_plus - s_plus / n + plus_dm[i];
            s_minus = s_minus - s_minus / n + minus_dm[i];
        }
        if s_tr == 0.0 {
            continue;
        }
        let pdi = 100.0 * s_plus / s_tr;
        let mdi = 100.0 * s_minus / s_tr;
        plus_di[i] = Some(pdi);
        minus_di[i] = Some(mdi);
        let total = pdi + mdi;
        dx[i] = Some(if total == 0.0 {
            0.0
        } else {
            100.0 * (pdi - mdi).abs() / total
        });
    }

    let mut adx = vec![None; bars.len()];
    let seed_end = 2 * period - 1;
    let seed: Option<Vec<f64>> = dx[period..=seed_end].iter().copied().collect();
    if let Some(seed) = seed {
        let mut current = seed.iter().sum::<f64>() / n;
        adx[seed_end] = Some(current);
        for i in seed_end + 1..bars.len() {
            match dx[i] {
                Some(v) => {
                    current = (current * (n - 1.0) + v) / n;
                    adx[i] = Some(current);
                }
                None => break,
            }
        }
    }

    Ok(DirectionalIndex {
        adx: IndicatorSeries {
            indicator_type,
            values: adx,
        },
        plus_di: IndicatorSeries {
            indicator_type,
            values: plus_di,
        },
        minus_di: IndicatorSeries {
            indicator_type,
            values: minus_di,
        },
    })
}
