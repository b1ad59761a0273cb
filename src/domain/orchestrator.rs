//! Daily driver: runs every configured strategy against the composite
//! portfolio and persists tomorrow's snapshot, or reconciles with the broker.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{error, info, info_span, warn};

use crate::domain::calendar::{next_business_day, roll_forward};
use crate::domain::composite::{CompositePortfolio, TransitionLog};
use crate::domain::error::RebalancerError;
use crate::domain::money::floor_cents;
use crate::domain::portfolio::SubPortfolio;
use crate::domain::position::OrderType;
use crate::domain::settings::{Settings, BROKER};
use crate::domain::strategy::engine::{Allocation, Engine};
use crate::domain::strategy::{build_strategy, StrategySpec};
use crate::ports::broker_port::{BrokerPort, BrokerPosition};
use crate::ports::data_port::DataPort;
use crate::ports::snapshot_port::SnapshotPort;

/// Which trading day a run is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSpec {
    Explicit(NaiveDate),
    Today,
    /// The most recent persisted snapshot.
    Latest,
}

impl DateSpec {
    /// `today`, `latest` or `YYYY-MM-DD`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "today" => Some(DateSpec::Today),
            "latest" => Some(DateSpec::Latest),
            other => NaiveDate::parse_from_str(other, "%Y-%m-%d")
                .ok()
                .map(DateSpec::Explicit),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunAction {
    /// Seed from configuration, then run.
    Start,
    /// Run from the day's persisted snapshot.
    Next,
    /// Reconcile the latest snapshot with the broker account.
    Sync,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Snapshot name written, e.g. `2024-03-05` or `2024-03-04_sync`.
    pub saved_as: String,
    pub portfolio: CompositePortfolio,
    /// Strategy keys that failed and kept their prior sub-portfolio.
    pub skipped: Vec<String>,
}

pub struct Orchestrator<'a> {
    settings: &'a Settings,
    data: &'a dyn DataPort,
    snapshots: &'a dyn SnapshotPort,
    broker: Option<&'a dyn BrokerPort>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(settings: &'a Settings, data: &'a dyn DataPort, snapshots: &'a dyn SnapshotPort) -> Self {
        Orchestrator {
            settings,
            data,
            snapshots,
            broker: None,
        }
    }

    pub fn with_broker(mut self, broker: &'a dyn BrokerPort) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Resolve `spec` to a trading day; weekends roll forward to Monday.
    pub fn resolve_date(&self, spec: DateSpec, today: NaiveDate) -> Result<NaiveDate, RebalancerError> {
        let date = match spec {
            DateSpec::Explicit(date) => date,
            DateSpec::Today => today,
            DateSpec::Latest => self
                .snapshots
                .latest_date(NaiveDate::MAX)?
                .ok_or(RebalancerError::SnapshotMissing { date: today })?,
        };
        let rolled = roll_forward(date);
        if rolled != date {
            info!(requested = %date, trading_day = %rolled, "weekend; rolling forward");
        }
        Ok(rolled)
    }

    pub fn run(
        &self,
        action: RunAction,
        date: NaiveDate,
        excluded: &BTreeSet<String>,
    ) -> Result<RunOutcome, RebalancerError> {
        let date = roll_forward(date);
        match action {
            RunAction::Start => {
                let seed = self.seed(date);
                self.snapshots.save(&date.to_string(), &seed)?;
                info!(date = %date, strategies = seed.strategies.len(), "seeded portfolio");
                self.advance(seed, date, excluded)
            }
            RunAction::Next => {
                let today = match self.snapshots.load(date)? {
                    Some(snapshot) => snapshot,
                    None => {
                        warn!(date = %date, "no snapshot for the day; seeding from configuration");
                        self.seed(date)
                    }
                };
                self.advance(today, date, excluded)
            }
            RunAction::Sync => self.sync(date),
        }
    }

    fn seed(&self, date: NaiveDate) -> CompositePortfolio {
        CompositePortfolio::seed(
            date,
            self.settings.initial_balance,
            self.settings.engine.leverage,
            &self.settings.allocations(),
        )
    }

    fn seeded_sub(&self, spec: &StrategySpec) -> SubPortfolio {
        SubPortfolio::seeded(floor_cents(self.settings.initial_balance * spec.percent / 100.0))
    }

    fn run_strategy(
        &self,
        spec: &StrategySpec,
        previous: SubPortfolio,
        date: NaiveDate,
        excluded: &BTreeSet<String>,
    ) -> Result<Allocation, RebalancerError> {
        let mut strategy = build_strategy(spec.clone());
        let universe = strategy.get_universe(self.data, date)?;
        let engine = Engine::new(spec, previous, date, &universe, self.data, self.settings.engine)?;
        strategy.init(&engine)?;
        engine.allocate(strategy.as_ref(), excluded)
    }

    /// Run every configured strategy for `date` and persist the next trading day.
    fn advance(
        &self,
        today: CompositePortfolio,
        date: NaiveDate,
        excluded: &BTreeSet<String>,
    ) -> Result<RunOutcome, RebalancerError> {
        let next_day = next_business_day(date);
        let mut next = today.clone();
        let mut by_strategy = BTreeMap::new();
        let mut skipped = Vec::new();

        for spec in &self.settings.strategies {
            let span = info_span!("strategy", key = %spec.key);
            let _entered = span.enter();

            let previous = match today.strategies.get(&spec.key) {
                Some(sub) => sub.clone(),
                None => {
                    info!(percent = spec.percent, "new strategy; seeding sub-portfolio");
                    self.seeded_sub(spec)
                }
            };
            match self.run_strategy(spec, previous.clone(), date, excluded) {
                Ok(allocation) => {
                    info!(
                        kind = %spec.kind,
                        rebalanced = allocation.rebalanced,
                        transitions = allocation.transitions.len(),
                        equity = allocation.portfolio.summary.equity,
                        "strategy allocated"
                    );
                    by_strategy.insert(spec.key.clone(), allocation.transitions);
                    next.strategies.insert(spec.key.clone(), allocation.portfolio);
                }
                Err(err) => {
                    error!(error = %err, "strategy skipped; keeping previous sub-portfolio");
                    skipped.push(spec.key.clone());
                    by_strategy.insert(spec.key.clone(), Vec::new());
                    next.strategies.insert(spec.key.clone(), previous);
                }
            }
        }

        for key in today.strategies.keys() {
            if self.settings.strategy(key).is_none() {
                warn!(strategy = %key, "not configured; carried unchanged");
            }
        }

        let log = TransitionLog {
            text: format!("Execute transitions at open {next_day}"),
            by_strategy,
        };
        next.date = next_day;
        next.leverage = self.settings.engine.leverage;
        next.text = None;
        next.compute_totals();
        let rendered = log.render();
        next.transitions = Some(log);

        let saved_as = next_day.to_string();
        self.snapshots.save(&saved_as, &next)?;
        // snapshot already committed
        if let Err(e) = self.snapshots.append_log(&rendered) {
            warn!(error = %e, snapshot = %saved_as, "transition log not appended");
        }

        log_summary(&next);
        Ok(RunOutcome {
            saved_as,
            portfolio: next,
            skipped,
        })
    }

    /// Fold the broker's view of positions and equity into the latest snapshot.
    fn sync(&self, date: NaiveDate) -> Result<RunOutcome, RebalancerError> {
        let broker = self
            .broker
            .ok_or_else(|| RebalancerError::missing(BROKER, "statement"))?;
        let snapshot_date = self
            .snapshots
            .latest_date(date)?
            .ok_or(RebalancerError::SnapshotMissing { date })?;
        let mut portfolio = self
            .snapshots
            .load(snapshot_date)?
            .ok_or(RebalancerError::SnapshotMissing { date: snapshot_date })?;

        let held = broker.positions()?;
        let equity = broker.equity()?;
        info!(
            snapshot = %snapshot_date,
            equity,
            cash = broker.cash()?,
            positions = held.len(),
            "broker account"
        );

        let mut holders: BTreeMap<&str, usize> = BTreeMap::new();
        for sub in portfolio.strategies.values() {
            for symbol in sub.positions.keys() {
                *holders.entry(symbol.as_str()).or_insert(0) += 1;
            }
        }
        let shared: BTreeSet<String> = holders
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(s, _)| s.to_string())
            .collect();

        let leverage = self.settings.engine.leverage;
        for (key, sub) in portfolio.strategies.iter_mut() {
            let span = info_span!("strategy", key = %key);
            let _entered = span.enter();
            reconcile(sub, &held, &shared);
            match self.settings.strategy(key) {
                Some(spec) => {
                    let sub_equity = floor_cents(equity * spec.percent / 100.0);
                    let upnl = floor_cents(sub.unrealized_pnl());
                    sub.summary.balance = floor_cents(sub_equity - upnl);
                    sub.recompute(leverage);
                }
                None => {
                    warn!("not configured; summary re-derived from its own balance");
                    sub.recompute(leverage);
                }
            }
        }

        portfolio.date = date;
        portfolio.leverage = leverage;
        portfolio.transitions = None;
        portfolio.text = Some(format!("Reconciled with broker on {date}"));
        portfolio.compute_totals();

        let saved_as = format!("{date}_sync");
        self.snapshots.save(&saved_as, &portfolio)?;
        log_summary(&portfolio);
        Ok(RunOutcome {
            saved_as,
            portfolio,
            skipped: Vec::new(),
        })
    }
}

/// Align one sub-portfolio with broker holdings.
///
/// Pending orders the broker does not show expired, and Market positions it
/// does not show were closed outside the system; both are dropped. Pending
/// orders the broker shows filled. A symbol held by only one strategy adopts
/// the broker's quantity, entry and last price.
pub fn reconcile(
    sub: &mut SubPortfolio,
    held: &BTreeMap<String, BrokerPosition>,
    shared: &BTreeSet<String>,
) {
    sub.positions.retain(|symbol, position| {
        let Some(actual) = held.get(symbol) else {
            if position.is_pending() {
                info!(symbol = %symbol, order = position.order_type.label(), "order not filled at broker; dropped");
            } else {
                warn!(symbol = %symbol, quantity = position.quantity, "no longer held at broker; dropped");
            }
            return false;
        };
        if position.is_pending() {
            info!(symbol = %symbol, "order filled at broker");
            position.order_type = OrderType::Market;
        }
        if shared.contains(symbol) {
            position.last_close = actual.last_price;
        } else {
            position.quantity = actual.signed_quantity();
            position.entry_price = actual.entry_price;
            position.last_close = actual.last_price;
            position.last_fill_price = Some(actual.entry_price);
        }
        true
    });
}

fn log_summary(portfolio: &CompositePortfolio) {
    for line in portfolio.summary_lines() {
        info!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::Position;
    use crate::ports::broker_port::Side;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn broker_position(side: Side, quantity: f64, entry: f64, last: f64) -> BrokerPosition {
        BrokerPosition {
            side,
            quantity,
            entry_price: entry,
            last_price: last,
        }
    }

    #[test]
    fn date_spec_parses_keywords_and_dates() {
        assert_eq!(DateSpec::parse("today"), Some(DateSpec::Today));
        assert_eq!(DateSpec::parse(" Latest "), Some(DateSpec::Latest));
        assert_eq!(
            DateSpec::parse("2024-03-04"),
            Some(DateSpec::Explicit(date(2024, 3, 4)))
        );
        assert_eq!(DateSpec::parse("04/03/2024"), None);
    }

    #[test]
    fn reconcile_drops_expired_and_closed_and_adopts_broker_values() {
        let day = date(2024, 3, 4);
        let mut sub = SubPortfolio::seeded(10_000.0);
        sub.add_position("GONE", Position::market(5.0, 10.0, day));
        sub.add_position("EXPIRED", Position::pending(3.0, 20.0, OrderType::DayLimit, day));
        sub.add_position("FILLED", Position::pending(2.0, 30.0, OrderType::DayStop, day));
        sub.add_position("SHARED", Position::market(1.0, 40.0, day));

        let held = BTreeMap::from([
            ("FILLED".to_string(), broker_position(Side::Buy, 2.0, 30.1, 31.0)),
            ("SHARED".to_string(), broker_position(Side::Buy, 4.0, 39.0, 42.0)),
        ]);
        let shared = BTreeSet::from(["SHARED".to_string()]);
        reconcile(&mut sub, &held, &shared);

        assert_eq!(sub.symbols(), BTreeSet::from(["FILLED".to_string(), "SHARED".to_string()]));
        let filled = sub.get_position("FILLED").unwrap();
        assert_eq!(filled.order_type, OrderType::Market);
        assert_eq!(filled.entry_price, 30.1);
        assert_eq!(filled.last_close, 31.0);

        let shared = sub.get_position("SHARED").unwrap();
        assert_eq!(shared.quantity, 1.0);
        assert_eq!(shared.entry_price, 40.0);
        assert_eq!(shared.last_close, 42.0);
    }

    #[test]
    fn reconcile_takes_short_side_from_broker() {
        let day = date(2024, 3, 4);
        let mut sub = SubPortfolio::seeded(1_000.0);
        sub.add_position("VXX", Position::market(-10.0, 20.0, day));
        let held = BTreeMap::from([("VXX".to_string(), broker_position(Side::Sell, 12.0, 19.5, 18.0))]);
        reconcile(&mut sub, &held, &BTreeSet::new());
        assert_eq!(sub.get_position("VXX").unwrap().quantity, -12.0);
    }
}
