//! rebalancer: daily multi-strategy portfolio rebalancing.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`], argument parsing and wiring in [`cli`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
