//! Position tracking and pending day-order state.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::ohlcv::OhlcvBar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    #[default]
    Market,
    DayLimit,
    DayStop,
}

impl OrderType {
    /// Day orders are pending until the next run resolves them.
    pub fn is_pending(self) -> bool {
        !matches!(self, OrderType::Market)
    }

    pub fn label(self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::DayLimit => "DAY LIMIT",
            OrderType::DayStop => "DAY STOP",
        }
    }
}

/// One open or pending exposure within one strategy's sub-portfolio.
///
/// `quantity` is signed (negative means short). For pending orders
/// `entry_price` is the trigger price and `last_close` mirrors it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub quantity: f64,
    pub entry_price: f64,
    pub last_close: f64,
    #[serde(default)]
    pub order_type: OrderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback_sweep: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lots: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fill_price: Option<f64>,
}

impl Position {
    pub fn market(quantity: f64, price: f64, entry_date: NaiveDate) -> Self {
        Position {
            quantity,
            entry_price: price,
            last_close: price,
            order_type: OrderType::Market,
            stop_price: None,
            target_price: None,
            entry_date: Some(entry_date),
            fallback_sweep: false,
            lots: None,
            last_fill_price: None,
        }
    }

    pub fn pending(quantity: f64, price: f64, order_type: OrderType, entry_date: NaiveDate) -> Self {
        Position {
            order_type,
            ..Position::market(quantity, price, entry_date)
        }
    }

    pub fn with_stop(mut self, stop: Option<f64>) -> Self {
        self.stop_price = stop;
        self
    }

    pub fn with_target(mut self, target: Option<f64>) -> Self {
        self.target_price = target;
        self
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0.0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0.0
    }

    pub fn is_pending(&self) -> bool {
        self.order_type.is_pending()
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity.abs() * price
    }

    /// Open P&L at `last_close`; pending orders have none.
    pub fn unrealized_pnl(&self) -> f64 {
        if self.is_pending() {
            return 0.0;
        }
        self.quantity * (self.last_close - self.entry_price)
    }

    /// Whether yesterday's bar would have filled this day order.
    ///
    /// Limit buys fill when `entry > low` and limit sells when `entry < high`.
    /// Stop buys fill when `entry < high` and stop sells when `entry > low`.
    pub fn fills_on(&self, bar: &OhlcvBar) -> bool {
        match self.order_type {
            OrderType::Market => true,
            OrderType::DayLimit if self.is_long() => self.entry_price > bar.low,
            OrderType::DayLimit => self.entry_price < bar.high,
            OrderType::DayStop if self.is_long() => self.entry_price < bar.high,
            OrderType::DayStop => self.entry_price > bar.low,
        }
    }

    /// Long stops trigger when the low trades below, short stops when the high trades above.
    pub fn stop_triggered(&self, bar: &OhlcvBar) -> bool {
        match self.stop_price {
            Some(stop) if self.is_long() => bar.low < stop,
            Some(stop) if self.is_short() => bar.high > stop,
            _ => false,
        }
    }

    /// Signed price move since entry in the position's favour.
    pub fn favourable_move(&self) -> f64 {
        (self.last_close - self.entry_price) * self.quantity.signum()
    }
}
