//! Cent-precision rounding helpers.
//!
//! Every monetary field (balances, equity, margin, cash, limit and stop
//! prices) goes through [`floor_cents`] after each mutation. It truncates
//! toward zero, never rounds half-even, and absorbs the binary representation
//! error of values that are already exact cents (`0.29 * 100` is
//! `28.999999999999996` in f64).

const CENT_EPSILON: f64 = 1e-6;

/// Truncate toward zero at two decimals.
pub fn floor_cents(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scaled = value * 100.0;
    let nudged = if scaled >= 0.0 {
        scaled + CENT_EPSILON
    } else {
        scaled - CENT_EPSILON
    };
    // `+ 0.0` folds a negative zero into positive zero
    nudged.trunc() / 100.0 + 0.0
}

/// Round half away from zero at two decimals.
pub fn round_cents(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    (value * 100.0).round() / 100.0 + 0.0
}

/// Whole units, truncated toward zero.
pub fn whole_units(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.trunc() + 0.0
}

/// How a strategy turns a money amount into a quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityRounding {
    /// Truncate to whole units.
    Whole,
    /// Truncate to cents of a unit.
    FloorCents,
    /// Round to cents of a unit.
    RoundCents,
}

impl QuantityRounding {
    pub fn apply(self, quantity: f64) -> f64 {
        match self {
            QuantityRounding::Whole => whole_units(quantity),
            QuantityRounding::FloorCents => floor_cents(quantity),
            QuantityRounding::RoundCents => round_cents(quantity),
        }
    }
}

/// Amount divided by price, rounded per `rounding`. Zero for a non-positive price.
pub fn quantity_for(amount: f64, price: f64, rounding: QuantityRounding) -> f64 {
    if price <= 0.0 || !price.is_finite() {
        return 0.0;
    }
    rounding.apply(amount / price)
}
