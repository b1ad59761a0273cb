//! Domain error types.

use chrono::NaiveDate;

use crate::domain::indicator::IndicatorError;

/// Top-level error type for rebalancer.
#[derive(Debug, thiserror::Error)]
pub enum RebalancerError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("insufficient data for {symbol}: have {bars} bars, need {minimum}")]
    InsufficientData {
        symbol: String,
        bars: usize,
        minimum: usize,
    },

    #[error("strategy {strategy}: mandatory instrument {symbol} has no usable data before {date}")]
    MissingMandatory {
        strategy: String,
        symbol: String,
        date: NaiveDate,
    },

    #[error("unknown strategy kind {0}")]
    UnknownStrategy(String),

    #[error(transparent)]
    Indicator(#[from] IndicatorError),

    #[error("no snapshot persisted on or before {date}")]
    SnapshotMissing { date: NaiveDate },

    #[error("malformed snapshot {path}: {reason}")]
    MalformedSnapshot { path: String, reason: String },

    #[error("broker error: {reason}")]
    Broker { reason: String },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RebalancerError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        RebalancerError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(section: &str, key: &str) -> Self {
        RebalancerError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }
}

impl From<&RebalancerError> for std::process::ExitCode {
    fn from(err: &RebalancerError) -> Self {
        let code: u8 = match err {
            RebalancerError::Io(_)
            | RebalancerError::Serialization(_)
            | RebalancerError::Indicator(_) => 1,
            RebalancerError::UnknownStrategy(_)
            | RebalancerError::ConfigParse { .. }
            | RebalancerError::ConfigMissing { .. }
            | RebalancerError::ConfigInvalid { .. } => 2,
            RebalancerError::Database { .. }
            | RebalancerError::DatabaseQuery { .. }
            | RebalancerError::NoData { .. }
            | RebalancerError::InsufficientData { .. }
            | RebalancerError::MissingMandatory { .. } => 3,
            RebalancerError::SnapshotMissing { .. } | RebalancerError::MalformedSnapshot { .. } => 4,
            RebalancerError::Broker { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::ExitCode;

    fn exit_code(err: &RebalancerError) -> String {
        format!("{:?}", ExitCode::from(err))
    }

    #[test]
    fn config_errors_map_to_exit_code_two() {
        let err = RebalancerError::missing("portfolio", "initial_balance");
        assert_eq!(exit_code(&err), format!("{:?}", ExitCode::from(2u8)));
        assert_eq!(
            err.to_string(),
            "missing config key [portfolio] initial_balance"
        );
    }

    #[test]
    fn snapshot_errors_map_to_exit_code_four() {
        let err = RebalancerError::MalformedSnapshot {
            path: "work/2024-01-02.json".into(),
            reason: "expected value".into(),
        };
        assert_eq!(exit_code(&err), format!("{:?}", ExitCode::from(4u8)));
    }

    #[test]
    fn mandatory_instrument_message_names_strategy_and_symbol() {
        let err = RebalancerError::MissingMandatory {
            strategy: "mr".into(),
            symbol: "SPYM".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "strategy mr: mandatory instrument SPYM has no usable data before 2024-03-04"
        );
        assert_eq!(exit_code(&err), format!("{:?}", ExitCode::from(3u8)));
    }
}
