//! Broker account read from a JSON statement export.
//!
//! ```json
//! {"cash": 1200.5, "equity": 10500.0,
//!  "positions": {"SPY": {"side": "buy", "quantity": 3, "entry_price": 470.1, "last_price": 480.0}}}
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::domain::error::RebalancerError;
use crate::ports::broker_port::{BrokerPort, BrokerPosition};

#[derive(Debug, Clone, Deserialize)]
struct Statement {
    cash: f64,
    equity: f64,
    #[serde(default)]
    positions: BTreeMap<String, BrokerPosition>,
}

pub struct StatementBrokerAdapter {
    statement: Statement,
}

impl StatementBrokerAdapter {
    pub fn from_file(path: &Path) -> Result<Self, RebalancerError> {
        let text = fs::read_to_string(path).map_err(|e| RebalancerError::Broker {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_json(&text).map_err(|e| match e {
            RebalancerError::Broker { reason } => RebalancerError::Broker {
                reason: format!("{}: {reason}", path.display()),
            },
            other => other,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, RebalancerError> {
        let statement = serde_json::from_str(text).map_err(|e| RebalancerError::Broker {
            reason: format!("malformed statement: {e}"),
        })?;
        Ok(Self { statement })
    }
}

impl BrokerPort for StatementBrokerAdapter {
    fn positions(&self) -> Result<BTreeMap<String, BrokerPosition>, RebalancerError> {
        Ok(self.statement.positions.clone())
    }

    fn cash(&self) -> Result<f64, RebalancerError> {
        Ok(self.statement.cash)
    }

    fn equity(&self) -> Result<f64, RebalancerError> {
        Ok(self.statement.equity)
    }
}
