//! Events raised to the presentation layer

use serde::{Deserialize, Serialize};
use stagehand_core::{ActionCenterItem, BatchId, Outcome};
use tokio::sync::mpsc;
use tracing::debug;

use crate::feed::{EntryId, FeedChange, MessageEntry};
use crate::tracker::PassCounters;

/// How the progress header is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ProgressDisplay {
    /// "Executing task {started} of {total}"
    Determinate { started: usize, total: usize },
    /// Spinner with no count (remote setups)
    Indeterminate,
}

/// Latest outcome of one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub index: usize,
    pub outcome: Outcome,
    pub message: String,
}

/// Final report of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub counters: PassCounters,
    pub retry_cycles: u32,
    pub retries_exhausted: bool,
    /// Error text of each task still failed
    pub unresolved: Vec<String>,
    /// Every task that ran, by index, with its latest outcome
    pub results: Vec<TaskResult>,
}

impl BatchSummary {
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Something the presentation layer should render
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    MessageAdded { position: usize, entry: MessageEntry },
    MessageRemoved { position: usize, id: EntryId },
    ActionCenterItemAdded(ActionCenterItem),
    ActionCenterItemRemoved(ActionCenterItem),
    ProgressChanged(ProgressDisplay),
    SetupTargetChanged { name: String },
    FailureCountChanged { failed: usize },
    RetryOffered { failed: usize },
    RetriesExhausted { failed: usize },
    BatchFinished(BatchSummary),
}

impl From<FeedChange> for OrchestratorEvent {
    fn from(change: FeedChange) -> Self {
        match change {
            FeedChange::Inserted { position, entry } => Self::MessageAdded { position, entry },
            FeedChange::Removed { position, id } => Self::MessageRemoved { position, id },
        }
    }
}

/// Sending half of the event stream
///
/// Emission is fail-open: a presentation layer that went away must not
/// disturb the batch.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<OrchestratorEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OrchestratorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: OrchestratorEvent) {
        if self.tx.send(event).is_err() {
            debug!("Event receiver dropped (fail-open)");
        }
    }

    pub fn emit_feed(&self, changes: impl IntoIterator<Item = FeedChange>) {
        for change in changes {
            self.emit(change.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::MessageFeed;
    use stagehand_core::Severity;

    #[tokio::test]
    async fn test_feed_changes_become_events() {
        let (sink, mut rx) = EventSink::channel();
        let mut feed = MessageFeed::new();

        let (id, change) = feed.begin("A...", 0);
        sink.emit_feed([change]);
        sink.emit_feed([feed.add("note", Severity::Info)]);

        match rx.recv().await.unwrap() {
            OrchestratorEvent::MessageAdded { position, entry } => {
                assert_eq!(position, 0);
                assert_eq!(entry.id, id);
                assert!(entry.in_progress);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            OrchestratorEvent::MessageAdded { position: 0, .. }
        ));
    }

    #[test]
    fn test_emit_after_receiver_dropped_is_silent() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(OrchestratorEvent::FailureCountChanged { failed: 1 });
    }
}
