//! Replication executor: drives each event through pull, tag and push

use crate::docker::DockerCli;
use crate::error::ReplicatorError;
use crate::replication::event::{EventReceiver, ReplicationEvent};
use std::fmt;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long a cancelled sequence gets to kill its command before being aborted
const CANCEL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationStep {
    Pull,
    Tag,
    Push,
}

impl fmt::Display for ReplicationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReplicationStep::Pull => "pull",
            ReplicationStep::Tag => "tag",
            ReplicationStep::Push => "push",
        })
    }
}

#[derive(Debug)]
pub enum ReplicationOutcome {
    Replicated,
    /// `step` is `None` when the sequence itself crashed
    Failed {
        step: Option<ReplicationStep>,
        error: ReplicatorError,
    },
    TimedOut,
    Cancelled,
}

impl ReplicationOutcome {
    pub fn is_replicated(&self) -> bool {
        matches!(self, ReplicationOutcome::Replicated)
    }
}

/// Running totals over the executor's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    pub replicated: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
}

impl ExecutorStats {
    fn record(&mut self, outcome: &ReplicationOutcome) {
        match outcome {
            ReplicationOutcome::Replicated => self.replicated += 1,
            ReplicationOutcome::Failed { .. } => self.failed += 1,
            ReplicationOutcome::TimedOut => self.timed_out += 1,
            ReplicationOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

pub struct ReplicationExecutor {
    source: DockerCli,
    destination: DockerCli,
    deadline: Duration,
}

impl ReplicationExecutor {
    pub fn new(source: DockerCli, destination: DockerCli, deadline: Duration) -> Self {
        Self {
            source,
            destination,
            deadline,
        }
    }

    /// Consumes events one at a time, in order, until the queue closes or `shutdown` fires
    pub async fn run(
        &self,
        mut events: EventReceiver,
        shutdown: CancellationToken,
    ) -> ExecutorStats {
        let mut stats = ExecutorStats::default();

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let outcome = self.replicate(&event, &shutdown).await;
            stats.record(&outcome);
        }

        info!(
            replicated = stats.replicated,
            failed = stats.failed,
            timed_out = stats.timed_out,
            cancelled = stats.cancelled,
            "replication executor stopped"
        );
        stats
    }

    /// Replicates one event within the outer deadline.
    ///
    /// The sequence runs in its own task. If the deadline passes first, the
    /// task's token is cancelled so the running command is killed, and the
    /// executor waits only a short grace period for it to wind down.
    pub async fn replicate(
        &self,
        event: &ReplicationEvent,
        shutdown: &CancellationToken,
    ) -> ReplicationOutcome {
        info!(repository = %event.repository, tag = %event.tag, "replicating image");
        let started = Instant::now();

        let cancel = shutdown.child_token();
        let mut sequence = tokio::spawn(run_sequence(
            self.source.clone(),
            self.destination.clone(),
            event.clone(),
            cancel.clone(),
        ));

        let joined = tokio::select! {
            joined = &mut sequence => Some(joined),
            _ = tokio::time::sleep(self.deadline) => None,
        };

        let outcome = match joined {
            Some(Ok(Ok(()))) => ReplicationOutcome::Replicated,
            Some(Ok(Err((step, error)))) if shutdown.is_cancelled() && error.is_interrupted() => {
                warn!(
                    repository = %event.repository,
                    tag = %event.tag,
                    %step,
                    "replication interrupted by shutdown"
                );
                ReplicationOutcome::Cancelled
            }
            Some(Ok(Err((step, error)))) => {
                error!(
                    repository = %event.repository,
                    tag = %event.tag,
                    %step,
                    error = %error,
                    "replication failed"
                );
                ReplicationOutcome::Failed {
                    step: Some(step),
                    error,
                }
            }
            Some(Err(join_error)) => {
                error!(
                    repository = %event.repository,
                    tag = %event.tag,
                    error = %join_error,
                    "replication task panicked"
                );
                ReplicationOutcome::Failed {
                    step: None,
                    error: ReplicatorError::Command {
                        command: event.to_string(),
                        reason: join_error.to_string(),
                    },
                }
            }
            None => {
                warn!(
                    repository = %event.repository,
                    tag = %event.tag,
                    deadline = %humantime::format_duration(self.deadline),
                    "replication time out, skip"
                );
                cancel.cancel();
                if tokio::time::timeout(CANCEL_GRACE, &mut sequence).await.is_err() {
                    warn!(
                        repository = %event.repository,
                        tag = %event.tag,
                        "replication task ignored cancellation, aborting"
                    );
                    sequence.abort();
                }
                ReplicationOutcome::TimedOut
            }
        };

        if outcome.is_replicated() {
            let elapsed = Duration::from_secs(started.elapsed().as_secs());
            info!(
                repository = %event.repository,
                tag = %event.tag,
                elapsed = %humantime::format_duration(elapsed),
                "replicated to remote registry successfully"
            );
        }
        outcome
    }
}

async fn run_sequence(
    source: DockerCli,
    destination: DockerCli,
    event: ReplicationEvent,
    cancel: CancellationToken,
) -> Result<(), (ReplicationStep, ReplicatorError)> {
    let ReplicationEvent { repository, tag } = &event;

    source
        .pull(repository, tag, &cancel)
        .await
        .map_err(|e| (ReplicationStep::Pull, e))?;
    destination
        .tag_from(source.endpoint(), repository, tag, &cancel)
        .await
        .map_err(|e| (ReplicationStep::Tag, e))?;
    destination
        .push(repository, tag, &cancel)
        .await
        .map_err(|e| (ReplicationStep::Push, e))?;
    Ok(())
}
