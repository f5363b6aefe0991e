//! Core orchestrator implementation

use stagehand_core::{
    ActionCenterItem, BatchId, ElevationChannel, OrchestratorConfig, Result, SetupTarget,
    SetupTask, Severity,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::events::{BatchSummary, EventSink, OrchestratorEvent, TaskResult};
use crate::feed::MessageEntry;
use crate::ledger::{Ledger, SharedLedger};
use crate::partition::{partition, single_phase};
use crate::record::TaskRecord;
use crate::retry::{Action, Event, RetryController, State};
use crate::runner::PhaseRunner;
use crate::tracker::{BatchState, PassCounters};

/// Runs a batch of setup tasks, with at most `retry_budget` retry passes
///
/// The presentation layer owns the receiver returned by [`Orchestrator::new`]
/// and drives the batch with [`run`](Self::run), then either
/// [`retry_failed_tasks`](Self::retry_failed_tasks) or [`finish`](Self::finish)
/// while a retry is on offer.
pub struct Orchestrator {
    id: BatchId,
    config: OrchestratorConfig,
    ledger: SharedLedger,
    controller: RetryController,
    runner: PhaseRunner,
    events: EventSink,
    next_pass: Vec<TaskRecord>,
    /// Latest attempt of every task that ran, ordered by index
    results: Vec<TaskRecord>,
}

impl Orchestrator {
    /// Create an orchestrator for a task list
    ///
    /// For remote targets only the first task is admitted.
    pub fn new(
        config: OrchestratorConfig,
        tasks: Vec<Arc<dyn SetupTask>>,
    ) -> (Self, mpsc::UnboundedReceiver<OrchestratorEvent>) {
        let id = BatchId::new();
        let (events, rx) = EventSink::channel();

        let mut records = TaskRecord::admit_all(tasks);
        if config.target.is_remote() && records.len() > 1 {
            warn!(
                batch = %id,
                dropped = records.len() - 1,
                "Remote setup runs a single task; ignoring the rest"
            );
            records.truncate(1);
        }

        let ledger = SharedLedger::new(Ledger::new(
            config.retry_budget,
            config.target.clone(),
            events.clone(),
        ));
        let runner = PhaseRunner::new(ledger.clone())
            .with_max_concurrency(config.max_concurrency)
            .with_strict_elevation(config.strict_elevation);

        let orchestrator = Self {
            id,
            controller: RetryController::new(config.retry_budget),
            config,
            ledger,
            runner,
            events,
            next_pass: records,
            results: Vec::new(),
        };
        (orchestrator, rx)
    }

    /// Route elevated tasks through this channel
    pub fn with_elevation(mut self, channel: Arc<dyn ElevationChannel>) -> Self {
        self.runner = self.runner.with_elevation(channel);
        self
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run the initial pass
    ///
    /// Returns the controller state after the pass drained: either
    /// `AwaitingRetryDecision` or `Finished`.
    pub async fn run(&mut self) -> Result<&State> {
        let actions = self.controller.apply(Event::Start {
            task_count: self.next_pass.len(),
        })?;
        info!(batch = %self.id, tasks = self.next_pass.len(), "Batch starting");
        self.perform(actions).await?;
        Ok(self.controller.state())
    }

    /// Re-run every failed task as one phase
    ///
    /// Only valid while a retry is on offer; otherwise returns
    /// `InvalidTransition` and nothing changes.
    pub async fn retry_failed_tasks(&mut self) -> Result<&State> {
        let actions = self.controller.apply(Event::RetryRequested)?;

        self.next_pass = self.ledger.with(|l| {
            l.clear_action_center();
            l.take_failed_for_retry()
        });
        info!(batch = %self.id, tasks = self.next_pass.len(), "Restarting failed tasks");

        self.perform(actions).await?;
        Ok(self.controller.state())
    }

    /// Accept the remaining failures and end the batch
    pub async fn finish(&mut self) -> Result<BatchSummary> {
        let actions = self.controller.apply(Event::Dismissed)?;
        self.perform(actions).await?;
        Ok(self.summary())
    }

    /// Append a freeform line to the feed
    pub fn add_message(&self, text: impl Into<String>, severity: Severity) {
        let text = text.into();
        self.ledger.with(|l| l.add_message(text, severity));
    }

    pub fn state(&self) -> &State {
        self.controller.state()
    }

    pub fn show_retry_button(&self) -> bool {
        self.controller.show_retry_button()
    }

    pub fn show_out_of_retries_banner(&self) -> bool {
        self.controller.show_out_of_retries_banner()
    }

    /// Snapshot of the feed
    pub fn messages(&self) -> Vec<MessageEntry> {
        self.ledger.with(|l| l.feed.entries().to_vec())
    }

    /// Snapshot of the action center
    pub fn action_center_items(&self) -> Vec<ActionCenterItem> {
        self.ledger.with(|l| l.action_center.clone())
    }

    /// Tasks whose latest attempt failed
    pub fn failed_tasks(&self) -> Vec<TaskRecord> {
        self.ledger.with(|l| l.tracker.failed_tasks().to_vec())
    }

    /// Latest attempt of every task that ran, ordered by index
    pub fn task_results(&self) -> &[TaskRecord] {
        &self.results
    }

    pub fn batch_state(&self) -> BatchState {
        self.ledger.with(|l| l.tracker.state().clone())
    }

    /// Counters as configured for reporting
    pub fn counters(&self) -> PassCounters {
        let mode = self.config.counter_mode;
        self.ledger.with(|l| l.tracker.state().report(mode))
    }

    pub fn summary(&self) -> BatchSummary {
        let mode = self.config.counter_mode;
        let (counters, retry_cycles, unresolved) = self.ledger.with(|l| {
            let state = l.tracker.state();
            let unresolved: Vec<String> = l
                .tracker
                .failed_tasks()
                .iter()
                .map(|r| r.profile.messages.error.clone())
                .collect();
            (state.report(mode), state.retry_cycle, unresolved)
        });
        let results = self
            .results
            .iter()
            .filter_map(|r| {
                Some(TaskResult {
                    index: r.index,
                    outcome: r.outcome?,
                    message: r.outcome_message()?.to_string(),
                })
            })
            .collect();
        BatchSummary {
            batch_id: self.id,
            counters,
            retry_cycles,
            retries_exhausted: self.controller.show_out_of_retries_banner(),
            unresolved,
            results,
        }
    }

    async fn perform(&mut self, actions: Vec<Action>) -> Result<()> {
        let mut queue: VecDeque<Action> = actions.into();
        while let Some(action) = queue.pop_front() {
            match action {
                Action::LogActivity { message } => info!(batch = %self.id, "{}", message),
                Action::RunPass { retry } => {
                    let failed = self.run_pass(retry).await?;
                    queue.extend(self.controller.apply(Event::PassDrained { failed })?);
                }
                Action::OfferRetry { failed } => {
                    self.events.emit(OrchestratorEvent::RetryOffered { failed });
                }
                Action::AnnounceRetriesExhausted { failed } => {
                    self.events
                        .emit(OrchestratorEvent::RetriesExhausted { failed });
                }
                Action::FinishBatch => {
                    let summary = self.summary();
                    info!(
                        batch = %self.id,
                        succeeded = summary.counters.succeeded_total(),
                        failed = summary.unresolved.len(),
                        "Batch finished"
                    );
                    self.events.emit(OrchestratorEvent::BatchFinished(summary));
                }
            }
        }
        Ok(())
    }

    /// Run one pass over `next_pass`; returns the number of failures
    async fn run_pass(&mut self, retry: bool) -> Result<usize> {
        let records = std::mem::take(&mut self.next_pass);
        self.ledger.with(|l| l.begin_pass(&records));

        let phases = match (&self.config.target, retry) {
            (_, true) => single_phase(records, "retry"),
            (SetupTarget::Remote { .. }, false) => single_phase(records, "remote"),
            (SetupTarget::Local, false) => partition(records),
        };

        for phase in phases {
            let finished = self.runner.run_phase(phase).await?;
            self.store_results(finished);
        }

        Ok(self.ledger.with(|l| {
            l.end_pass();
            debug_assert!(l.tracker.pass_drained());
            l.tracker.failed_tasks().len()
        }))
    }

    /// Keep the latest attempt per task index
    fn store_results(&mut self, finished: Vec<TaskRecord>) {
        for record in finished {
            match self.results.iter_mut().find(|r| r.index == record.index) {
                Some(slot) => *slot = record,
                None => self.results.push(record),
            }
        }
        self.results.sort_by_key(|r| r.index);
    }
}
