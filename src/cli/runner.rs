//! Process runner: startup checks, registry logins and the two replication loops

use crate::config::ReplicatorConfig;
use crate::docker::{CommandRunner, DockerCli, ProcessRunner};
use crate::error::Result;
use crate::registry::{CatalogSource, HarborClient};
use crate::replication::{ChangeDetector, ExecutorStats, ReplicationExecutor, event_queue};
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct Runner {
    config: ReplicatorConfig,
    catalog: Arc<dyn CatalogSource>,
    commands: Arc<dyn CommandRunner>,
}

impl Runner {
    pub fn new(config: ReplicatorConfig) -> Result<Self> {
        let catalog = Arc::new(HarborClient::new(&config.source, config.http_timeout)?);
        let commands = Arc::new(ProcessRunner::new(config.command.stream_output));
        Ok(Self::with_components(config, catalog, commands))
    }

    /// Builds a runner around an existing catalog and command runner
    pub fn with_components(
        config: ReplicatorConfig,
        catalog: Arc<dyn CatalogSource>,
        commands: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            config,
            catalog,
            commands,
        }
    }

    /// Runs until Ctrl-C
    pub async fn run(&self) -> Result<ExecutorStats> {
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("received Ctrl-C, shutting down"),
                Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
            }
            signal.cancel();
        });

        self.run_until(shutdown).await
    }

    /// Logs in to both registries, then detects and replicates until `shutdown` fires.
    ///
    /// A failed login is returned as an error before anything else starts.
    pub async fn run_until(&self, shutdown: CancellationToken) -> Result<ExecutorStats> {
        let config = &self.config;
        let watermark = config.watermark(Utc::now());

        info!(
            source = %config.source.host(),
            destination = %config.destination.host(),
            since = %watermark,
            "starting harbor replicator"
        );

        let local = DockerCli::new(
            self.commands.clone(),
            config.source.clone(),
            config.command.clone(),
        );
        local.login(&shutdown).await?;

        let remote = DockerCli::new(
            self.commands.clone(),
            config.destination.clone(),
            config.command.clone(),
        );
        remote.login(&shutdown).await?;

        let (events_tx, events_rx) = event_queue(config.queue_capacity);
        let detector = ChangeDetector::new(
            self.catalog.clone(),
            config.projects.clone(),
            watermark,
            config.poll_interval,
        );
        let detection = tokio::spawn(detector.run(events_tx, shutdown.clone()));

        let executor = ReplicationExecutor::new(local, remote, config.event_deadline);
        let stats = executor.run(events_rx, shutdown.clone()).await;

        // The executor only returns early on shutdown or if detection died.
        shutdown.cancel();
        if let Err(e) = detection.await {
            warn!(error = %e, "change detection task failed");
        }

        Ok(stats)
    }
}
