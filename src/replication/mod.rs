//! Replication orchestration
//!
//! The [`ChangeDetector`] turns catalog changes into [`ReplicationEvent`]s on a
//! single-producer single-consumer queue. The [`ReplicationExecutor`] drains
//! that queue one event at a time, each under its own deadline.

pub mod detector;
pub mod event;
pub mod executor;

pub use detector::{ChangeDetector, CycleSummary};
pub use event::{EventReceiver, EventSender, QueueClosed, ReplicationEvent, event_queue};
pub use executor::{ExecutorStats, ReplicationExecutor, ReplicationOutcome, ReplicationStep};
