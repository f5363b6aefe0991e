//! Serialized batch state shared by concurrently running tasks
//!
//! The message feed, the outcome tracker and the action center live behind
//! one mutex. Every observable mutation happens in a single critical section
//! and emits its events while the lock is held, so the event stream replays
//! the list in exactly the order it changed.

use stagehand_core::{
    ActionCenterItem, ActionRequestKind, MessageSink, Outcome, Result, SetupTarget, Severity,
};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

use crate::events::{EventSink, OrchestratorEvent, ProgressDisplay};
use crate::feed::{EntryId, MessageFeed};
use crate::record::TaskRecord;
use crate::tracker::OutcomeTracker;

/// Everything the concurrent completions mutate
#[derive(Debug)]
pub struct Ledger {
    pub(crate) feed: MessageFeed,
    pub(crate) tracker: OutcomeTracker,
    pub(crate) action_center: Vec<ActionCenterItem>,
    target: SetupTarget,
    events: EventSink,
}

impl Ledger {
    pub fn new(retry_budget: u32, target: SetupTarget, events: EventSink) -> Self {
        Self {
            feed: MessageFeed::new(),
            tracker: OutcomeTracker::new(retry_budget),
            action_center: Vec::new(),
            target,
            events,
        }
    }

    /// Admit the records of a pass and reset the progress header
    pub fn begin_pass(&mut self, records: &[TaskRecord]) {
        self.tracker.begin_pass(records);
        let display = if self.target.is_remote() {
            ProgressDisplay::Indeterminate
        } else {
            ProgressDisplay::Determinate {
                started: 0,
                total: records.len(),
            }
        };
        self.events.emit(OrchestratorEvent::ProgressChanged(display));
    }

    /// Close out a pass
    pub fn end_pass(&mut self) {
        if self.target.is_remote() {
            let state = self.tracker.state();
            self.events
                .emit(OrchestratorEvent::ProgressChanged(ProgressDisplay::Determinate {
                    started: state.pass.started,
                    total: state.pass_size,
                }));
        }
    }

    /// A task began executing: count it and append its running line
    pub fn task_started(&mut self, record: &TaskRecord) -> Result<EntryId> {
        self.tracker.record_start(record.index)?;
        let (id, change) = self.feed.begin(record.executing_message.clone(), record.index);

        match &self.target {
            SetupTarget::Remote { name } => {
                let name = record
                    .profile
                    .target_display_name
                    .clone()
                    .unwrap_or_else(|| name.clone());
                self.events
                    .emit(OrchestratorEvent::SetupTargetChanged { name });
            }
            SetupTarget::Local => {
                let state = self.tracker.state();
                self.events
                    .emit(OrchestratorEvent::ProgressChanged(ProgressDisplay::Determinate {
                        started: state.pass.started,
                        total: state.pass_size,
                    }));
            }
        }

        self.events.emit(change.into());
        debug!(task_index = record.index, entry = %id, "Task started");
        Ok(id)
    }

    /// A task produced its outcome: count it, raise notices, settle its line
    pub fn task_finished(
        &mut self,
        record: &TaskRecord,
        entry: EntryId,
        outcome: Outcome,
        detail: Option<String>,
    ) -> Result<()> {
        self.tracker.record(record, outcome)?;

        match outcome {
            Outcome::SucceededNeedsReboot => {
                self.push_front_notice(record.profile.reboot_notice());
            }
            Outcome::Failed => {
                let mut notice = record.profile.error_notice();
                if let Some(detail) = detail {
                    notice = notice.with_detail(detail);
                }
                self.push_front_notice(notice);
            }
            Outcome::Succeeded => {}
        }

        let finished_text = record.profile.messages.for_outcome(outcome);
        let changes = self.feed.settle(entry, outcome, finished_text)?;
        self.events.emit_feed(changes);

        self.events.emit(OrchestratorEvent::FailureCountChanged {
            failed: self.tracker.state().pass.failed,
        });
        Ok(())
    }

    /// Freeform line from a task or the presentation layer
    pub fn add_message(&mut self, text: String, severity: Severity) {
        let change = self.feed.add(text, severity);
        self.events.emit(change.into());
    }

    /// Add or remove an action center notice
    pub fn update_action_center(&mut self, item: ActionCenterItem, kind: ActionRequestKind) {
        match kind {
            ActionRequestKind::Add => {
                self.action_center.push(item.clone());
                self.events
                    .emit(OrchestratorEvent::ActionCenterItemAdded(item));
            }
            ActionRequestKind::Remove => {
                match self.action_center.iter().position(|i| i.id == item.id) {
                    Some(position) => {
                        let removed = self.action_center.remove(position);
                        self.events
                            .emit(OrchestratorEvent::ActionCenterItemRemoved(removed));
                    }
                    None => warn!(item = %item.title, "Removing unknown action center item"),
                }
            }
        }
    }

    /// Drop every action center notice (a retry pass starts clean)
    pub fn clear_action_center(&mut self) {
        for item in std::mem::take(&mut self.action_center) {
            self.events
                .emit(OrchestratorEvent::ActionCenterItemRemoved(item));
        }
    }

    /// Consume the failed set for a retry pass
    pub fn take_failed_for_retry(&mut self) -> Vec<TaskRecord> {
        let failed = self.tracker.take_failed_for_retry();
        self.events
            .emit(OrchestratorEvent::FailureCountChanged { failed: 0 });
        failed
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    fn push_front_notice(&mut self, item: ActionCenterItem) {
        self.action_center.insert(0, item.clone());
        self.events
            .emit(OrchestratorEvent::ActionCenterItemAdded(item));
    }
}

/// Cloneable handle to the single serialization point
#[derive(Debug, Clone)]
pub struct SharedLedger(Arc<Mutex<Ledger>>);

impl SharedLedger {
    pub fn new(ledger: Ledger) -> Self {
        Self(Arc::new(Mutex::new(ledger)))
    }

    /// Run one critical section
    ///
    /// Records carry a [`TaskProfile`](crate::record::TaskProfile) snapshot,
    /// so no task code runs under the lock and a poisoned mutex can only come
    /// from a bug in this crate; the data is still used as-is.
    pub fn with<R>(&self, f: impl FnOnce(&mut Ledger) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

/// The [`MessageSink`] handed to one running task
pub struct TaskReporter {
    ledger: SharedLedger,
    task_index: usize,
}

impl TaskReporter {
    pub fn new(ledger: SharedLedger, task_index: usize) -> Self {
        Self { ledger, task_index }
    }
}

impl MessageSink for TaskReporter {
    fn add_message(&self, text: String, severity: Severity) {
        debug!(task_index = self.task_index, %severity, "Task message");
        self.ledger.with(|l| l.add_message(text, severity));
    }

    fn update_action_center(&self, item: ActionCenterItem, kind: ActionRequestKind) {
        debug!(task_index = self.task_index, ?kind, "Task action center update");
        self.ledger.with(|l| l.update_action_center(item, kind));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use stagehand_core::{LoadingMessages, SetupTask};

    struct Labeled(&'static str, bool);

    #[async_trait]
    impl SetupTask for Labeled {
        fn loading_messages(&self) -> LoadingMessages {
            LoadingMessages::for_label(self.0)
        }

        fn requires_reboot(&self) -> bool {
            self.1
        }

        async fn execute(&self, _sink: &dyn MessageSink) -> Result<Outcome> {
            Ok(Outcome::Succeeded)
        }
    }

    fn ledger() -> (Ledger, tokio::sync::mpsc::UnboundedReceiver<OrchestratorEvent>) {
        let (events, rx) = EventSink::channel();
        (Ledger::new(1, SetupTarget::Local, events), rx)
    }

    fn drain(
        rx: &mut tokio::sync::mpsc::UnboundedReceiver<OrchestratorEvent>,
    ) -> Vec<OrchestratorEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn test_failure_adds_detailed_notice_first() {
        let (mut ledger, mut rx) = ledger();
        let records = TaskRecord::admit_all(vec![
            Arc::new(Labeled("Git", true)) as Arc<dyn SetupTask>,
            Arc::new(Labeled("Clone", false)) as Arc<dyn SetupTask>,
        ]);
        ledger.begin_pass(&records);

        let a = ledger.task_started(&records[0]).unwrap();
        let b = ledger.task_started(&records[1]).unwrap();
        ledger
            .task_finished(&records[0], a, Outcome::SucceededNeedsReboot, None)
            .unwrap();
        ledger
            .task_finished(&records[1], b, Outcome::Failed, Some("network down".to_string()))
            .unwrap();

        assert_eq!(ledger.action_center.len(), 2);
        assert_eq!(ledger.action_center[0].title, "Clone: failed");
        assert_eq!(ledger.action_center[0].detail.as_deref(), Some("network down"));
        assert_eq!(ledger.action_center[1].severity, Severity::Warning);

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, OrchestratorEvent::FailureCountChanged { failed: 1 })));
        assert!(events.iter().any(|e| matches!(
            e,
            OrchestratorEvent::ProgressChanged(ProgressDisplay::Determinate {
                started: 2,
                total: 2
            })
        )));
    }

    #[test]
    fn test_action_center_remove_and_clear() {
        let (mut ledger, mut rx) = ledger();
        let item = ActionCenterItem::new("Sign in required", Severity::Info);

        ledger.update_action_center(item.clone(), ActionRequestKind::Add);
        ledger.update_action_center(ActionCenterItem::error("other"), ActionRequestKind::Add);
        ledger.update_action_center(item.clone(), ActionRequestKind::Remove);
        assert_eq!(ledger.action_center.len(), 1);

        // Removing twice is tolerated
        ledger.update_action_center(item, ActionRequestKind::Remove);

        ledger.clear_action_center();
        assert!(ledger.action_center.is_empty());

        let removed = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, OrchestratorEvent::ActionCenterItemRemoved(_)))
            .count();
        assert_eq!(removed, 2);
    }

    #[test]
    fn test_remote_target_reports_name() {
        let (events, mut rx) = EventSink::channel();
        let mut ledger = Ledger::new(
            1,
            SetupTarget::Remote {
                name: "devbox".to_string(),
            },
            events,
        );
        let records = TaskRecord::admit_all(vec![
            Arc::new(Labeled("Configure", false)) as Arc<dyn SetupTask>
        ]);
        ledger.begin_pass(&records);
        ledger.task_started(&records[0]).unwrap();

        let events = drain(&mut rx);
        assert_eq!(
            events[0],
            OrchestratorEvent::ProgressChanged(ProgressDisplay::Indeterminate)
        );
        assert!(events.contains(&OrchestratorEvent::SetupTargetChanged {
            name: "devbox".to_string()
        }));
    }

    #[test]
    fn test_reporter_writes_through_ledger() {
        let (ledger, mut rx) = ledger();
        let shared = SharedLedger::new(ledger);
        let reporter = TaskReporter::new(shared.clone(), 0);

        reporter.add_message("Downloading".to_string(), Severity::Info);

        assert_eq!(shared.with(|l| l.feed.len()), 1);
        assert!(matches!(
            rx.try_recv().unwrap(),
            OrchestratorEvent::MessageAdded { position: 0, .. }
        ));
    }
}
