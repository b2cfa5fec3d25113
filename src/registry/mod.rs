//! Registry module for source registry interactions
//!
//! This module provides the Harbor catalog client and the per-repository tag
//! status tracker used to detect newly pushed tags.

pub mod catalog;
pub mod status;

pub use catalog::{CatalogSource, HarborClient, Project, TagRecord};
pub use status::{RepositoryTagStatus, TagStatusTracker, TagUpdate};
