//! Core domain types and logic.

pub mod calendar;
pub mod composite;
pub mod config_validation;
pub mod error;
pub mod indicator;
pub mod money;
pub mod ohlcv;
pub mod orchestrator;
pub mod portfolio;
pub mod position;
pub mod resample;
pub mod settings;
pub mod strategy;
pub mod transition;
pub mod universe;
