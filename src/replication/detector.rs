//! Change detection: polls the source catalog and emits replication events

use crate::registry::{CatalogSource, Project, TagStatusTracker};
use crate::replication::event::{EventSender, QueueClosed, ReplicationEvent};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What one detection cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub discovered: usize,
    pub polled: usize,
    pub failed: usize,
    pub emitted: usize,
    pub suppressed: usize,
}

pub struct ChangeDetector {
    catalog: Arc<dyn CatalogSource>,
    tracker: TagStatusTracker,
    /// Empty means every project in the catalog
    projects: Vec<String>,
    watermark: DateTime<Utc>,
    poll_interval: Duration,
}

impl ChangeDetector {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        projects: Vec<String>,
        watermark: DateTime<Utc>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            catalog,
            tracker: TagStatusTracker::new(),
            projects,
            watermark,
            poll_interval,
        }
    }

    pub fn tracker(&self) -> &TagStatusTracker {
        &self.tracker
    }

    /// Runs detection cycles until `shutdown` fires or the executor goes away
    pub async fn run(mut self, events: EventSender, shutdown: CancellationToken) {
        info!(
            projects = ?self.projects,
            since = %self.watermark,
            interval = %humantime::format_duration(self.poll_interval),
            "change detection started"
        );

        loop {
            let cycle = tokio::select! {
                _ = shutdown.cancelled() => break,
                cycle = self.run_cycle(&events) => cycle,
            };

            match cycle {
                Ok(summary) => debug!(?summary, "detection cycle finished"),
                Err(closed) => {
                    info!("{}, stopping change detection", closed);
                    break;
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(
            repositories = self.tracker.known_repositories().len(),
            "change detection stopped"
        );
    }

    /// One discovery pass followed by one polling pass.
    ///
    /// Events are sent as soon as each repository is refreshed, so a full
    /// bounded queue holds the cycle back until the executor catches up.
    pub async fn run_cycle(&mut self, events: &EventSender) -> Result<CycleSummary, QueueClosed> {
        let mut summary = CycleSummary {
            discovered: self.discover().await,
            ..CycleSummary::default()
        };

        for repository in self.tracker.known_repositories() {
            let updates = match self
                .tracker
                .refresh_tags(self.catalog.as_ref(), &repository)
                .await
            {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(%repository, error = %e, "failed to refresh repository tags, skipping");
                    summary.failed += 1;
                    continue;
                }
            };
            summary.polled += 1;

            for update in updates {
                if update.created > self.watermark {
                    let event = ReplicationEvent::new(repository.as_str(), update.tag);
                    info!(
                        %repository,
                        tag = %event.tag,
                        created = %update.created,
                        "detected new tag"
                    );
                    events.send(event).await?;
                    summary.emitted += 1;
                } else {
                    debug!(
                        %repository,
                        tag = %update.tag,
                        created = %update.created,
                        "tag predates the since watermark, recorded without replication"
                    );
                    summary.suppressed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Registers every repository of the watched projects. Returns how many were new.
    pub async fn discover(&mut self) -> usize {
        let projects = match self.watched_projects().await {
            Some(projects) => projects,
            None => return 0,
        };

        let mut discovered = 0;
        for project in projects {
            let repositories = match self.catalog.list_repositories(&project).await {
                Ok(repositories) => repositories,
                Err(e) => {
                    warn!(
                        project = %project.name,
                        error = %e,
                        "failed to list project repositories"
                    );
                    continue;
                }
            };

            for repository in repositories {
                if self.tracker.register_repository(&repository) {
                    debug!(project = %project.name, %repository, "tracking repository");
                    discovered += 1;
                }
            }
        }

        if discovered > 0 {
            info!(
                discovered,
                total = self.tracker.known_repositories().len(),
                "discovered new repositories"
            );
        }
        discovered
    }

    /// Resolves the watched projects from a single project listing, sorted by name.
    ///
    /// Configured names missing from the listing are logged and skipped.
    async fn watched_projects(&self) -> Option<Vec<Project>> {
        let mut listed = match self.catalog.list_projects().await {
            Ok(projects) => projects,
            Err(e) => {
                warn!(error = %e, "failed to list projects, skipping discovery");
                return None;
            }
        };
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        listed.dedup_by(|a, b| a.name == b.name);

        if self.projects.is_empty() {
            return Some(listed);
        }

        for name in &self.projects {
            if !listed.iter().any(|p| &p.name == name) {
                warn!(project = %name, "Can't find project in the registry");
            }
        }
        listed.retain(|p| self.projects.contains(&p.name));
        Some(listed)
    }
}
