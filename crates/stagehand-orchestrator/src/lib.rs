//! # stagehand-orchestrator
//!
//! Execution engine for Stagehand setup batches.
//!
//! This crate provides:
//! - Dependency-phase partitioning of a task list
//! - Concurrent phase execution with per-task failure isolation
//! - Exactly-once outcome tracking and aggregate counters
//! - A retry controller allowing a bounded number of passes over failures
//! - An ordered progress feed where running entries always trail settled ones
//! - An event stream for the presentation layer

mod events;
mod feed;
mod ledger;
mod orchestrator;
mod partition;
mod record;
mod retry;
mod runner;
mod tracker;

pub use events::{BatchSummary, EventSink, OrchestratorEvent, ProgressDisplay, TaskResult};
pub use feed::{EntryId, FeedChange, MessageEntry, MessageFeed};
pub use ledger::{Ledger, SharedLedger, TaskReporter};
pub use orchestrator::Orchestrator;
pub use partition::{partition, single_phase, Phase};
pub use record::{TaskProfile, TaskRecord};
pub use retry::{transition, Action, Event, RetryController, State};
pub use runner::PhaseRunner;
pub use tracker::{BatchState, OutcomeTracker, PassCounters};
