//! OHLCV bar representation and per-instrument price history.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl OhlcvBar {
    /// high - low
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    pub fn dollar_volume(&self) -> f64 {
        self.close * self.volume
    }
}

/// Ascending, date-ordered bars for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceHistory {
    symbol: String,
    bars: Vec<OhlcvBar>,
}

impl PriceHistory {
    pub fn new(symbol: impl Into<String>, mut bars: Vec<OhlcvBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        Self {
            symbol: symbol.into(),
            bars,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[OhlcvBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&OhlcvBar> {
        self.bars.last()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    /// Close `n` bars before the latest one; `close_back(0)` is the latest close.
    pub fn close_back(&self, n: usize) -> Option<f64> {
        let len = self.bars.len();
        if n >= len {
            return None;
        }
        Some(self.bars[len - 1 - n].close)
    }

    /// `close / close_back(n) * 100`.
    pub fn return_ratio(&self, n: usize) -> Option<f64> {
        let last = self.last_close()?;
        let past = self.close_back(n)?;
        if past == 0.0 {
            return None;
        }
        Some(last / past * 100.0)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    /// Bar-over-bar close ratios, one shorter than the history.
    pub fn daily_ratios(&self) -> Vec<f64> {
        self.bars
            .windows(2)
            .map(|w| w[1].close / w[0].close)
            .collect()
    }
}
