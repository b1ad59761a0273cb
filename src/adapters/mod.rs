//! Concrete implementations of the port traits.

pub mod csv_adapter;
pub mod file_config_adapter;
pub mod json_snapshot_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
pub mod statement_broker_adapter;
