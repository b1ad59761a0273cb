//! The persisted, top-level portfolio: one sub-portfolio per strategy key.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::money::floor_cents;
use super::portfolio::{SubPortfolio, Summary};
use super::transition::TransitionRecord;

/// Top-level snapshot keys; strategy keys may not reuse them.
pub const RESERVED_KEYS: &[&str] = &["date", "leverage", "summary", "transitions", "text"];

/// Transitions from the previous day, grouped by strategy key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionLog {
    pub text: String,
    #[serde(flatten)]
    pub by_strategy: BTreeMap<String, Vec<TransitionRecord>>,
}

impl TransitionLog {
    pub fn is_empty(&self) -> bool {
        self.by_strategy.values().all(Vec::is_empty)
    }

    /// One line per record, prefixed by the strategy key.
    pub fn render(&self) -> String {
        let mut out = self.text.clone();
        for (key, records) in &self.by_strategy {
            for record in records {
                out.push_str(&format!("\n[{key}] {}", record.description));
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositePortfolio {
    pub date: NaiveDate,
    pub leverage: f64,
    #[serde(default)]
    pub summary: Summary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transitions: Option<TransitionLog>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub strategies: BTreeMap<String, SubPortfolio>,
}

impl CompositePortfolio {
    /// Split `initial_balance` by per-strategy percentages.
    pub fn seed(
        date: NaiveDate,
        initial_balance: f64,
        leverage: f64,
        allocations: &[(String, f64)],
    ) -> Self {
        let strategies = allocations
            .iter()
            .map(|(key, percent)| {
                (
                    key.clone(),
                    SubPortfolio::seeded(floor_cents(initial_balance * percent / 100.0)),
                )
            })
            .collect();
        let mut composite = CompositePortfolio {
            date,
            leverage,
            summary: Summary::default(),
            transitions: None,
            text: None,
            strategies,
        };
        composite.compute_totals();
        composite
    }

    pub fn compute_totals(&mut self) {
        self.summary = Summary::total(self.strategies.values().map(|s| &s.summary));
    }

    /// Pretty JSON with every object's keys in sorted order.
    pub fn to_sorted_json(&self) -> Result<String, serde_json::Error> {
        // serde_json::Value objects are BTreeMaps without the preserve_order feature
        let value = serde_json::to_value(self)?;
        serde_json::to_string_pretty(&value)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Net quantity per symbol across all strategies, dropping flat symbols.
    pub fn aggregate_quantities(&self) -> BTreeMap<String, f64> {
        let mut totals: BTreeMap<String, f64> = BTreeMap::new();
        for sub in self.strategies.values() {
            for (symbol, pos) in &sub.positions {
                *totals.entry(symbol.clone()).or_insert(0.0) += pos.quantity;
            }
        }
        totals.retain(|_, q| q.abs() >= 0.005);
        totals
    }

    /// Human-readable summary lines for the operator.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (key, sub) in &self.strategies {
            let s = &sub.summary;
            lines.push(format!(
                "{key}: equity {} balance {} cash {} margin {} upnl {} ({} positions)",
                s.equity,
                s.balance,
                s.cash,
                s.margin,
                s.upnl,
                sub.position_count()
            ));
        }
        for (symbol, qty) in self.aggregate_quantities() {
            lines.push(format!("{symbol}: {qty}"));
        }
        let t = &self.summary;
        lines.push(format!(
            "Totals: balance {}, equity {}, margin {}, free_margin {}, upnl {}",
            t.balance, t.equity, t.margin, t.free_margin, t.upnl
        ));
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::Position;
    use crate::domain::transition::TradeAction;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    fn seeded() -> CompositePortfolio {
        CompositePortfolio::seed(
            day(),
            10_000.0,
            1.0,
            &[("ra".to_string(), 60.0), ("dt".to_string(), 40.0)],
        )
    }

    #[test]
    fn seed_splits_balance_by_percent() {
        let composite = seeded();
        assert_eq!(composite.strategies["ra"].summary.balance, 6000.0);
        assert_eq!(composite.strategies["dt"].summary.balance, 4000.0);
        assert_eq!(composite.summary.equity, 10_000.0);
    }

    #[test]
    fn json_keys_are_sorted_and_strategies_are_top_level() {
        let composite = seeded();
        let json = composite.to_sorted_json().unwrap();
        let date_at = json.find("\"date\"").unwrap();
        let dt_at = json.find("\"dt\"").unwrap();
        let leverage_at = json.find("\"leverage\"").unwrap();
        let ra_at = json.find("\"ra\"").unwrap();
        assert!(date_at < dt_at && dt_at < leverage_at && leverage_at < ra_at);
    }

    #[test]
    fn json_round_trip_is_stable() {
        let mut composite = seeded();
        composite
            .strategies
            .get_mut("ra")
            .unwrap()
            .add_position("SPY", Position::market(3.0, 400.0, day()));
        composite.transitions = Some(TransitionLog {
            text: "Execute transitions at open 2024-03-04".into(),
            by_strategy: BTreeMap::from([(
                "ra".to_string(),
                vec![TransitionRecord {
                    instrument: "SPY".into(),
                    action: TradeAction::Buy,
                    quantity: 3.0,
                    description: "Buy 3 of SPY, change from 0 to 3".into(),
                }],
            )]),
        });
        let first = composite.to_sorted_json().unwrap();
        let parsed = CompositePortfolio::from_json(&first).unwrap();
        assert_eq!(parsed, composite);
        assert_eq!(parsed.to_sorted_json().unwrap(), first);
    }

    #[test]
    fn malformed_strategy_entry_is_rejected() {
        let text = r#"{"date":"2024-03-04","leverage":1.0,"ra":{"tickers":5}}"#;
        assert!(CompositePortfolio::from_json(text).is_err());
    }

    #[test]
    fn aggregate_quantities_nets_across_strategies() {
        let mut composite = seeded();
        composite
            .strategies
            .get_mut("ra")
            .unwrap()
            .add_position("SPY", Position::market(3.0, 400.0, day()));
        composite
            .strategies
            .get_mut("dt")
            .unwrap()
            .add_position("SPY", Position::market(-3.0, 400.0, day()));
        assert!(composite.aggregate_quantities().is_empty());
    }

    #[test]
    fn transition_log_render() {
        let log = TransitionLog {
            text: "Execute transitions at open 2024-03-04".into(),
            by_strategy: BTreeMap::from([("ra".to_string(), vec![])]),
        };
        assert!(log.is_empty());
        assert_eq!(log.render(), "Execute transitions at open 2024-03-04");
    }
}
