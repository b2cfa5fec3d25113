//! Harbor Replicator Library
//!
//! This file serves as the library root for the harbor-replicator crate,
//! organizing and exposing the modules that detect new tags on a source
//! Harbor registry and replicate them to a destination registry.

pub mod cli;
pub mod config;
pub mod docker;
pub mod error;
pub mod logging;
pub mod registry;
pub mod replication;

pub use config::{RegistryEndpoint, ReplicatorConfig};
pub use error::{ReplicatorError, Result};
