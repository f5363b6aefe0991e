//! Per-task outcome bookkeeping and aggregate counters

use serde::{Deserialize, Serialize};
use stagehand_core::{CounterMode, Outcome, Result, StagehandError};
use std::collections::HashSet;
use tracing::debug;

use crate::record::TaskRecord;

/// Counters for one pass over a task set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassCounters {
    pub started: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub succeeded_needs_reboot: usize,
    pub failed: usize,
}

impl PassCounters {
    /// Successes of either kind
    pub fn succeeded_total(&self) -> usize {
        self.succeeded + self.succeeded_needs_reboot
    }

    /// `completed == succeeded + succeeded_needs_reboot + failed`
    pub fn is_balanced(&self) -> bool {
        self.completed == self.succeeded_total() + self.failed
    }

    fn absorb_successes(&mut self, pass: &PassCounters) {
        self.succeeded += pass.succeeded;
        self.succeeded_needs_reboot += pass.succeeded_needs_reboot;
        self.completed += pass.succeeded_total();
        self.started += pass.succeeded_total();
    }
}

/// Aggregate state of a batch, including retry progress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchState {
    /// Counters for the pass currently running (or last run)
    pub pass: PassCounters,
    /// Successes carried over from earlier passes
    pub carried: PassCounters,
    /// Tasks admitted into the current pass
    pub pass_size: usize,
    /// Retry passes consumed so far
    pub retry_cycle: u32,
    /// Retry passes allowed
    pub retry_budget: u32,
}

impl BatchState {
    /// Counters as reported under the given mode
    pub fn report(&self, mode: CounterMode) -> PassCounters {
        match mode {
            CounterMode::PerPass => self.pass,
            CounterMode::Cumulative => {
                let mut total = self.pass;
                total.absorb_successes(&self.carried);
                total
            }
        }
    }

    pub fn retries_remaining(&self) -> u32 {
        self.retry_budget.saturating_sub(self.retry_cycle)
    }
}

/// Records task outcomes exactly once per attempt and collects failures
#[derive(Debug, Default)]
pub struct OutcomeTracker {
    state: BatchState,
    failed: Vec<TaskRecord>,
    admitted: HashSet<usize>,
    started: HashSet<usize>,
    settled: HashSet<usize>,
}

impl OutcomeTracker {
    pub fn new(retry_budget: u32) -> Self {
        Self {
            state: BatchState {
                retry_budget,
                ..BatchState::default()
            },
            ..Self::default()
        }
    }

    /// Admit the records of a new pass
    pub fn begin_pass(&mut self, records: &[TaskRecord]) {
        self.admitted = records.iter().map(|r| r.index).collect();
        self.started.clear();
        self.settled.clear();
        self.state.pass_size = records.len();
    }

    /// Count a task as started
    pub fn record_start(&mut self, index: usize) -> Result<()> {
        if !self.admitted.contains(&index) {
            return Err(StagehandError::InvariantViolation(format!(
                "task {} started but was never admitted",
                index
            )));
        }
        if !self.started.insert(index) {
            return Err(StagehandError::InvariantViolation(format!(
                "task {} started twice in one pass",
                index
            )));
        }
        self.state.pass.started += 1;
        Ok(())
    }

    /// Apply one task's outcome
    pub fn record(&mut self, record: &TaskRecord, outcome: Outcome) -> Result<()> {
        let index = record.index;
        if !self.started.contains(&index) {
            return Err(StagehandError::InvariantViolation(format!(
                "outcome reported for unknown task {}",
                index
            )));
        }
        if !self.settled.insert(index) {
            return Err(StagehandError::InvariantViolation(format!(
                "task {} reported an outcome twice",
                index
            )));
        }

        let pass = &mut self.state.pass;
        pass.completed += 1;
        match outcome {
            Outcome::Succeeded => pass.succeeded += 1,
            Outcome::SucceededNeedsReboot => pass.succeeded_needs_reboot += 1,
            Outcome::Failed => {
                pass.failed += 1;
                let mut failed = record.clone();
                failed.outcome = Some(outcome);
                self.failed.push(failed);
            }
        }

        debug!(task_index = index, %outcome, "Recorded task outcome");
        Ok(())
    }

    /// Whether every admitted task has reported
    pub fn pass_drained(&self) -> bool {
        self.settled.len() == self.admitted.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn failed_tasks(&self) -> &[TaskRecord] {
        &self.failed
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    /// Consume one retry: hand back the failed set and reset the pass
    ///
    /// Successes of the finished pass move into the carried counters.
    pub fn take_failed_for_retry(&mut self) -> Vec<TaskRecord> {
        let pass = self.state.pass;
        self.state.carried.absorb_successes(&pass);
        self.state.pass = PassCounters::default();
        self.state.retry_cycle += 1;

        let mut failed = std::mem::take(&mut self.failed);
        for record in &mut failed {
            record.reset();
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use stagehand_core::{LoadingMessages, MessageSink, SetupTask};
    use std::sync::Arc;

    struct Noop;

    #[async_trait]
    impl SetupTask for Noop {
        fn loading_messages(&self) -> LoadingMessages {
            LoadingMessages::for_label("noop")
        }

        async fn execute(&self, _sink: &dyn MessageSink) -> stagehand_core::Result<Outcome> {
            Ok(Outcome::Succeeded)
        }
    }

    fn records(n: usize) -> Vec<TaskRecord> {
        TaskRecord::admit_all((0..n).map(|_| Arc::new(Noop) as Arc<dyn SetupTask>))
    }

    fn run(tracker: &mut OutcomeTracker, record: &TaskRecord, outcome: Outcome) {
        tracker.record_start(record.index).unwrap();
        tracker.record(record, outcome).unwrap();
    }

    #[test]
    fn test_counters_balance() {
        let records = records(4);
        let mut tracker = OutcomeTracker::new(1);
        tracker.begin_pass(&records);

        run(&mut tracker, &records[0], Outcome::Succeeded);
        run(&mut tracker, &records[1], Outcome::SucceededNeedsReboot);
        run(&mut tracker, &records[2], Outcome::Failed);
        assert!(!tracker.pass_drained());
        run(&mut tracker, &records[3], Outcome::Failed);

        let pass = tracker.state().pass;
        assert!(tracker.pass_drained());
        assert_eq!(pass.started, 4);
        assert_eq!(pass.completed, 4);
        assert_eq!(pass.succeeded, 1);
        assert_eq!(pass.succeeded_needs_reboot, 1);
        assert_eq!(pass.failed, 2);
        assert!(pass.is_balanced());
        assert_eq!(tracker.failed_tasks().len(), 2);
        assert_eq!(tracker.failed_tasks()[0].outcome, Some(Outcome::Failed));
    }

    #[test]
    fn test_double_report_rejected() {
        let records = records(1);
        let mut tracker = OutcomeTracker::new(1);
        tracker.begin_pass(&records);
        run(&mut tracker, &records[0], Outcome::Failed);

        let err = tracker.record(&records[0], Outcome::Failed).unwrap_err();
        assert!(err.is_invariant_violation());
        assert_eq!(tracker.state().pass.failed, 1);
        assert_eq!(tracker.failed_tasks().len(), 1);
    }

    #[test]
    fn test_unknown_task_rejected() {
        let admitted = records(1);
        let stranger = records(3).remove(2);
        let mut tracker = OutcomeTracker::new(1);
        tracker.begin_pass(&admitted);

        assert!(tracker.record_start(stranger.index).is_err());
        assert!(tracker.record(&stranger, Outcome::Succeeded).is_err());
        assert_eq!(tracker.state().pass.completed, 0);
    }

    #[test]
    fn test_double_start_rejected() {
        let records = records(1);
        let mut tracker = OutcomeTracker::new(1);
        tracker.begin_pass(&records);
        tracker.record_start(0).unwrap();
        assert!(tracker.record_start(0).is_err());
        assert_eq!(tracker.state().pass.started, 1);
    }

    #[test]
    fn test_retry_carries_successes() {
        let records = records(3);
        let mut tracker = OutcomeTracker::new(1);
        tracker.begin_pass(&records);
        run(&mut tracker, &records[0], Outcome::Succeeded);
        run(&mut tracker, &records[1], Outcome::Failed);
        run(&mut tracker, &records[2], Outcome::Failed);

        let retry = tracker.take_failed_for_retry();
        assert_eq!(retry.len(), 2);
        assert!(retry.iter().all(|r| r.outcome.is_none()));
        assert!(!tracker.has_failures());
        assert_eq!(tracker.state().retry_cycle, 1);
        assert_eq!(tracker.state().retries_remaining(), 0);
        assert_eq!(tracker.state().pass, PassCounters::default());

        tracker.begin_pass(&retry);
        run(&mut tracker, &retry[0], Outcome::Succeeded);
        run(&mut tracker, &retry[1], Outcome::Failed);

        let cumulative = tracker.state().report(CounterMode::Cumulative);
        assert_eq!(cumulative.succeeded, 2);
        assert_eq!(cumulative.failed, 1);
        assert_eq!(cumulative.completed, 3);
        assert!(cumulative.is_balanced());

        let per_pass = tracker.state().report(CounterMode::PerPass);
        assert_eq!(per_pass.succeeded, 1);
        assert_eq!(per_pass.started, 2);
        assert!(per_pass.is_balanced());
    }
}
