//! Command line interface module
//!
//! This module provides argument parsing and the runner that wires the catalog
//! client, change detector and replication executor together.

pub mod args;
pub mod runner;

pub use args::Args;
pub use runner::Runner;
