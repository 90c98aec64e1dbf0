//! distlock command line
//!
//! Wraps a command so that at most one copy runs at a time across every
//! process sharing the same lock key and Redis nodes.

pub mod command;
pub mod config;
pub mod metrics;
pub mod startup;

pub use command::{RunOutcome, execute, run};
pub use config::{Cli, Command, RunArgs};
