//! Port traits at the I/O seams.

pub mod broker_port;
pub mod config_port;
pub mod data_port;
pub mod snapshot_port;
