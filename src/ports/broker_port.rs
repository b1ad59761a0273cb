//! Broker account port trait (sync mode only).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::error::RebalancerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// One position as the broker reports it; `quantity` is unsigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub side: Side,
    pub quantity: f64,
    pub entry_price: f64,
    pub last_price: f64,
}

impl BrokerPosition {
    pub fn signed_quantity(&self) -> f64 {
        match self.side {
            Side::Buy => self.quantity.abs(),
            Side::Sell => -self.quantity.abs(),
        }
    }
}

pub trait BrokerPort {
    fn positions(&self) -> Result<BTreeMap<String, BrokerPosition>, RebalancerError>;
    fn cash(&self) -> Result<f64, RebalancerError>;
    fn equity(&self) -> Result<f64, RebalancerError>;
}
