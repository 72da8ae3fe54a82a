//! Failover status reconciler
//!
//! Watches Redis failover instances and their workloads, resolves each
//! instance's status and records every transition in the service log.
//!
//! # Modules
//!
//! - [`config`] - command line and environment configuration
//! - [`app`] - health server and engine wiring

#![deny(missing_docs)]

pub mod app;
pub mod config;

pub use config::Config;
