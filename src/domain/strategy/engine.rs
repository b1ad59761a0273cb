//! Shared per-run plumbing every strategy is driven through.
//!
//! Construction fetches data, resolves yesterday's day orders, marks held
//! positions to market and derives the allocatable capital. [`Engine::allocate`]
//! then asks a strategy for tomorrow's sub-portfolio and diffs it.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::domain::error::RebalancerError;
use crate::domain::money::floor_cents;
use crate::domain::ohlcv::{OhlcvBar, PriceHistory};
use crate::domain::portfolio::SubPortfolio;
use crate::domain::position::{OrderType, Position};
use crate::domain::transition::{diff_positions, settle, TransitionRecord};
use crate::ports::data_port::DataPort;

use super::sizing::merge_entry;
use super::{Strategy, StrategySpec};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub leverage: f64,
    /// Share of equity available for sizing, in percent.
    pub alloc_percent: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            leverage: 1.0,
            alloc_percent: 99.5,
        }
    }
}

/// Result of one allocation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub portfolio: SubPortfolio,
    pub transitions: Vec<TransitionRecord>,
    pub closed: BTreeSet<String>,
    pub rebalanced: bool,
}

#[derive(Debug)]
pub struct Engine {
    key: String,
    as_of: NaiveDate,
    leverage: f64,
    portfolio: SubPortfolio,
    histories: BTreeMap<String, PriceHistory>,
    latest: BTreeMap<String, OhlcvBar>,
    candidates: Vec<String>,
    reserved: BTreeSet<String>,
    allocatable: f64,
}

impl Engine {
    /// Load data for `universe`, held and reserved instruments, then resolve
    /// and mark `previous` as of the close before `as_of`.
    pub fn new(
        spec: &StrategySpec,
        previous: SubPortfolio,
        as_of: NaiveDate,
        universe: &[String],
        data_port: &dyn DataPort,
        settings: EngineSettings,
    ) -> Result<Self, RebalancerError> {
        let reserved = spec.reserved_symbols();
        let held = previous.symbols();
        let wanted: BTreeSet<&String> = universe
            .iter()
            .chain(held.iter())
            .chain(reserved.iter())
            .collect();

        let mut histories = BTreeMap::new();
        let mut latest = BTreeMap::new();
        for symbol in wanted {
            let bars = match data_port.fetch_series(symbol, as_of, spec.lookback) {
                Ok(bars) => bars,
                Err(e) => {
                    warn!(strategy = %spec.key, symbol = %symbol, error = %e, "price history unavailable");
                    Vec::new()
                }
            };
            let history = PriceHistory::new(symbol.as_str(), bars);
            if let Some(bar) = history.last() {
                latest.insert(symbol.clone(), bar.clone());
            }
            if history.len() >= spec.lookback {
                histories.insert(symbol.clone(), history);
            } else if held.contains(symbol) {
                warn!(
                    strategy = %spec.key,
                    symbol = %symbol,
                    bars = history.len(),
                    needed = spec.lookback,
                    "held instrument kept with short history"
                );
            } else {
                debug!(
                    strategy = %spec.key,
                    symbol = %symbol,
                    bars = history.len(),
                    needed = spec.lookback,
                    "instrument excluded for short history"
                );
            }
        }

        for symbol in &reserved {
            if !histories.contains_key(symbol) {
                return Err(RebalancerError::MissingMandatory {
                    strategy: spec.key.clone(),
                    symbol: symbol.clone(),
                    date: as_of,
                });
            }
        }

        let candidates = universe
            .iter()
            .filter(|s| histories.contains_key(*s) && !reserved.contains(*s))
            .cloned()
            .collect();

        let mut engine = Engine {
            key: spec.key.clone(),
            as_of,
            leverage: settings.leverage,
            portfolio: previous,
            histories,
            latest,
            candidates,
            reserved,
            allocatable: 0.0,
        };
        engine.resolve_day_orders();
        engine.mark_to_market();
        engine.allocatable = floor_cents(
            engine.portfolio.summary.equity * settings.alloc_percent / 100.0 * settings.leverage,
        );
        Ok(engine)
    }

    /// Filled day orders become Market; unfilled ones are dropped, freeing their cash.
    fn resolve_day_orders(&mut self) {
        let pending: Vec<String> = self
            .portfolio
            .positions
            .iter()
            .filter(|(_, p)| p.is_pending())
            .map(|(s, _)| s.clone())
            .collect();

        for symbol in pending {
            let filled = match (self.latest.get(&symbol), self.portfolio.get_position(&symbol)) {
                (Some(bar), Some(order)) => order.fills_on(bar),
                _ => {
                    warn!(strategy = %self.key, symbol = %symbol, "no bar to resolve day order; expiring it");
                    false
                }
            };
            if filled {
                if let Some(order) = self.portfolio.positions.get_mut(&symbol) {
                    info!(
                        strategy = %self.key,
                        symbol = %symbol,
                        order = order.order_type.label(),
                        price = order.entry_price,
                        "day order filled"
                    );
                    order.order_type = OrderType::Market;
                    order.last_fill_price = Some(order.entry_price);
                }
            } else if let Some(order) = self.portfolio.remove_position(&symbol) {
                info!(
                    strategy = %self.key,
                    symbol = %symbol,
                    order = order.order_type.label(),
                    price = order.entry_price,
                    "day order expired"
                );
            }
        }
    }

    fn mark_to_market(&mut self) {
        for (symbol, position) in self.portfolio.positions.iter_mut() {
            if let Some(bar) = self.latest.get(symbol) {
                position.last_close = bar.close;
            }
        }
        self.portfolio.recompute(self.leverage);
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn leverage(&self) -> f64 {
        self.leverage
    }

    /// Sub-portfolio after day-order resolution and mark-to-market.
    pub fn portfolio(&self) -> &SubPortfolio {
        &self.portfolio
    }

    pub fn allocatable(&self) -> f64 {
        self.allocatable
    }

    /// Universe members with a full history, in universe order, reserved symbols excluded.
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn is_reserved(&self, symbol: &str) -> bool {
        self.reserved.contains(symbol)
    }

    /// Full-length history; `None` for excluded instruments.
    pub fn history(&self, symbol: &str) -> Option<&PriceHistory> {
        self.histories.get(symbol)
    }

    /// Yesterday's bar, available even for held instruments with a short history.
    pub fn bar(&self, symbol: &str) -> Option<&OhlcvBar> {
        self.latest.get(symbol)
    }

    pub fn last_close(&self, symbol: &str) -> Option<f64> {
        self.latest.get(symbol).map(|b| b.close)
    }

    /// Held slot positions open to exit checks, in symbol order.
    ///
    /// Skips reserved and swept instruments and excluded symbols. Short
    /// histories are included, so price-level exits (stops, take-profit,
    /// time-to-live) still see them through [`Engine::bar`].
    pub fn held_checks<'a>(
        &'a self,
        excluded: &'a BTreeSet<String>,
    ) -> impl Iterator<Item = (&'a String, &'a Position)> + 'a {
        self.portfolio.positions.iter().filter(move |(s, p)| {
            !p.fallback_sweep && !self.is_reserved(s) && !excluded.contains(*s)
        })
    }

    /// [`Engine::held_checks`] restricted to holdings with a full history,
    /// for indicator-based exits.
    pub fn exit_checks<'a>(
        &'a self,
        excluded: &'a BTreeSet<String>,
    ) -> impl Iterator<Item = (&'a String, &'a Position, &'a PriceHistory)> + 'a {
        self.held_checks(excluded)
            .filter_map(move |(s, p)| self.histories.get(s).map(|h| (s, p, h)))
    }

    /// Candidates free for a new entry: not held, not closing, not excluded.
    pub fn entry_checks<'a>(
        &'a self,
        closing: &'a BTreeSet<String>,
        excluded: &'a BTreeSet<String>,
    ) -> impl Iterator<Item = (&'a String, &'a PriceHistory)> + 'a {
        self.candidates.iter().filter_map(move |s| {
            if self.portfolio.has_position(s) || closing.contains(s) || excluded.contains(s) {
                return None;
            }
            self.histories.get(s).map(|h| (s, h))
        })
    }

    /// No positions, today's summary; the starting point of a full re-rank.
    pub fn fresh_portfolio(&self) -> SubPortfolio {
        SubPortfolio {
            positions: BTreeMap::new(),
            summary: self.portfolio.summary,
        }
    }

    /// Today's portfolio unchanged, minus `closing`.
    pub fn carry_forward(&self, closing: &BTreeSet<String>) -> SubPortfolio {
        let mut next = self.portfolio.clone();
        for symbol in closing {
            next.remove_position(symbol);
        }
        next
    }

    /// Insert `fresh` into `target`, merged with the position held today.
    pub fn place(&self, target: &mut SubPortfolio, symbol: &str, fresh: Position) {
        let merged = merge_entry(self.portfolio.get_position(symbol), fresh);
        target.add_position(symbol, merged);
    }

    /// Run one strategy pass: exits, allocation (when due), diff and settlement.
    pub fn allocate(
        &self,
        strategy: &dyn Strategy,
        excluded: &BTreeSet<String>,
    ) -> Result<Allocation, RebalancerError> {
        let closing = strategy.to_be_closed(self, excluded);
        let rebalanced = strategy
            .cadence()
            .is_due(self.as_of, self.portfolio.is_empty());

        let mut next = if rebalanced {
            strategy.allocate(self, &closing, excluded)?
        } else {
            debug!(strategy = %self.key, "not a rebalance day; carrying positions");
            self.carry_forward(&closing)
        };
        for symbol in &closing {
            next.remove_position(symbol);
        }

        let transitions = diff_positions(&self.portfolio, &next);
        let realized = settle(&self.portfolio, &mut next, self.leverage);
        if !closing.is_empty() {
            info!(
                strategy = %self.key,
                closed = ?closing,
                realized,
                "positions closed"
            );
        }
        Ok(Allocation {
            portfolio: next,
            transitions,
            closed: closing,
            rebalanced,
        })
    }
}
