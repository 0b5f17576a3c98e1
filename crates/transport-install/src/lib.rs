//! # transport-install
//!
//! Runs one delivery cycle of the transport agent over all running guests.
//! Configuration comes from `TRANSPORT_*` environment variables; see
//! [`InstallConfig::from_env`].

pub mod config;

pub use config::{ConfigError, InstallConfig};
