//! Concurrent execution of one phase
//!
//! Every task of a phase is spawned onto the runtime and the phase returns
//! only once all of them reported. Task failures, including panics, are
//! caught at the per-task boundary and recorded as [`Outcome::Failed`].

use futures::future::join_all;
use futures::FutureExt;
use stagehand_core::{ElevationChannel, MessageSink, Outcome, Result, StagehandError};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use crate::ledger::{SharedLedger, TaskReporter};
use crate::partition::Phase;
use crate::record::TaskRecord;

/// Runs phases against a shared ledger
#[derive(Clone)]
pub struct PhaseRunner {
    ledger: SharedLedger,
    elevation: Option<Arc<dyn ElevationChannel>>,
    limiter: Option<Arc<Semaphore>>,
    strict_elevation: bool,
}

impl PhaseRunner {
    pub fn new(ledger: SharedLedger) -> Self {
        Self {
            ledger,
            elevation: None,
            limiter: None,
            strict_elevation: false,
        }
    }

    pub fn with_elevation(mut self, channel: Arc<dyn ElevationChannel>) -> Self {
        self.elevation = Some(channel);
        self
    }

    /// Bound the number of tasks running at once
    pub fn with_max_concurrency(mut self, max: Option<usize>) -> Self {
        self.limiter = max.map(|n| Arc::new(Semaphore::new(n.max(1))));
        self
    }

    pub fn with_strict_elevation(mut self, strict: bool) -> Self {
        self.strict_elevation = strict;
        self
    }

    /// Run every task of the phase concurrently and wait for all of them
    ///
    /// Returns the records with their outcomes. An error here is an
    /// orchestration invariant violation, never a task failure.
    #[instrument(skip(self, phase), fields(phase = %phase.name, tasks = phase.len()))]
    pub async fn run_phase(&self, phase: Phase) -> Result<Vec<TaskRecord>> {
        info!("Starting phase {}", phase.number);

        let handles: Vec<_> = phase
            .records
            .into_iter()
            .map(|record| {
                let runner = self.clone();
                tokio::spawn(async move { runner.run_task(record).await })
            })
            .collect();

        let mut finished = Vec::with_capacity(handles.len());
        let mut violation = None;
        for result in join_all(handles).await {
            match result {
                Ok(Ok(record)) => finished.push(record),
                Ok(Err(e)) => {
                    error!(error = %e, "Task bookkeeping failed");
                    violation.get_or_insert(e);
                }
                Err(e) => {
                    error!(error = %e, "Task worker did not complete");
                    violation.get_or_insert(StagehandError::InvariantViolation(format!(
                        "task worker did not complete: {}",
                        e
                    )));
                }
            }
        }

        if let Some(e) = violation {
            return Err(e);
        }

        info!(completed = finished.len(), "Phase drained");
        Ok(finished)
    }

    async fn run_task(&self, mut record: TaskRecord) -> Result<TaskRecord> {
        let _permit = match &self.limiter {
            Some(limiter) => Some(limiter.clone().acquire_owned().await.map_err(|_| {
                StagehandError::InvariantViolation("worker pool closed".to_string())
            })?),
            None => None,
        };

        let entry = self.ledger.with(|l| l.task_started(&record))?;
        let reporter = TaskReporter::new(self.ledger.clone(), record.index);

        let attempt = AssertUnwindSafe(self.dispatch(&record, &reporter))
            .catch_unwind()
            .await;

        let (outcome, detail) = match attempt {
            Ok(Ok(outcome)) => (settle_outcome(outcome, record.profile.requires_reboot), None),
            Ok(Err(e)) => {
                warn!(task_index = record.index, error = %e, "Task failed");
                (Outcome::Failed, Some(e.to_string()))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(task_index = record.index, panic = %message, "Task panicked");
                (Outcome::Failed, Some(format!("Task panicked: {}", message)))
            }
        };

        record.outcome = Some(outcome);
        self.ledger
            .with(|l| l.task_finished(&record, entry, outcome, detail))?;
        Ok(record)
    }

    async fn dispatch(&self, record: &TaskRecord, sink: &dyn MessageSink) -> Result<Outcome> {
        let task = &record.task;
        if record.profile.requires_elevation {
            match &self.elevation {
                Some(channel) => {
                    info!(
                        task_index = record.index,
                        channel = %channel.describe(),
                        "Starting task as admin"
                    );
                    return task.execute_elevated(channel.as_ref(), sink).await;
                }
                None if self.strict_elevation => {
                    return Err(StagehandError::ElevationUnavailable(format!(
                        "'{}' requires elevation and no channel was supplied",
                        record.executing_message
                    )));
                }
                None => {
                    debug!(
                        task_index = record.index,
                        "No elevation channel; running task normally"
                    );
                }
            }
        }
        task.execute(sink).await
    }
}

/// A plain success from a task that declares a reboot requirement needs one
fn settle_outcome(outcome: Outcome, requires_reboot: bool) -> Outcome {
    match outcome {
        Outcome::Succeeded if requires_reboot => Outcome::SucceededNeedsReboot,
        other => other,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
