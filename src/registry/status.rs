//! Per-repository tag status tracking
//!
//! The tracker remembers, for every repository it has seen, the newest creation
//! time observed for each tag. A refresh compares a freshly fetched tag list
//! against that memory and reports only the tags that are new or have advanced.

use crate::error::Result;
use crate::registry::catalog::{CatalogSource, TagRecord};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// Tag name to last observed creation time, for one repository
pub type RepositoryTagStatus = HashMap<String, DateTime<Utc>>;

/// A tag that is new or whose creation time advanced during a refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagUpdate {
    pub tag: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct TagStatusTracker {
    repositories: BTreeMap<String, RepositoryTagStatus>,
}

impl TagStatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all tracked repositories, sorted
    pub fn known_repositories(&self) -> Vec<String> {
        self.repositories.keys().cloned().collect()
    }

    /// Starts tracking `name` with an empty status. Returns false if already tracked.
    pub fn register_repository(&mut self, name: &str) -> bool {
        if self.repositories.contains_key(name) {
            return false;
        }
        self.repositories
            .insert(name.to_string(), RepositoryTagStatus::new());
        true
    }

    pub fn last_seen(&self, repository: &str, tag: &str) -> Option<DateTime<Utc>> {
        self.repositories
            .get(repository)
            .and_then(|status| status.get(tag))
            .copied()
    }

    /// Fetches the tags of `repository` and applies them.
    ///
    /// On error nothing is recorded for the repository: the whole tag list is
    /// fetched and validated before any stored time is touched.
    pub async fn refresh_tags(
        &mut self,
        catalog: &dyn CatalogSource,
        repository: &str,
    ) -> Result<Vec<TagUpdate>> {
        let tags = catalog.list_tags(repository).await?;
        Ok(self.apply(repository, tags))
    }

    /// Records `tags` for `repository` and returns the delta, oldest first.
    ///
    /// A tag enters the delta when it was never seen or its creation time is
    /// strictly newer than the stored one. Stored times never decrease, and tags
    /// missing from `tags` are left as they are.
    pub fn apply(&mut self, repository: &str, tags: Vec<TagRecord>) -> Vec<TagUpdate> {
        let status = self
            .repositories
            .entry(repository.to_string())
            .or_default();

        let mut changed: HashMap<String, DateTime<Utc>> = HashMap::new();
        for TagRecord { name, created } in tags {
            let advanced = status.get(&name).is_none_or(|last| created > *last);
            if advanced {
                status.insert(name.clone(), created);
                changed.insert(name, created);
            }
        }

        let mut delta: Vec<TagUpdate> = changed
            .into_iter()
            .map(|(tag, created)| TagUpdate { tag, created })
            .collect();
        delta.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.tag.cmp(&b.tag)));
        delta
    }
}
