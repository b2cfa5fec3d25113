//! Image management through the docker CLI
//!
//! Image data never passes through the replicator: the local docker daemon
//! pulls, retags and pushes, and this module only drives it.

pub mod client;
pub mod runner;

pub use client::DockerCli;
pub use runner::{CommandRunner, CommandSpec, ProcessRunner};
