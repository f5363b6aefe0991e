//! Orchestration metadata wrapped around one task

use stagehand_core::{ActionCenterItem, LoadingMessages, Outcome, SetupTask};
use std::sync::Arc;

/// Contract values read from a task once, when it is admitted
///
/// Everything the orchestrator needs besides `execute` comes from here, so
/// no task code runs after the per-task boundary or under the ledger lock.
#[derive(Debug, Clone)]
pub struct TaskProfile {
    pub messages: LoadingMessages,
    pub requires_elevation: bool,
    pub requires_reboot: bool,
    pub depends_on_prerequisite: bool,
    pub target_display_name: Option<String>,
    error_notice: ActionCenterItem,
    reboot_notice: ActionCenterItem,
}

impl TaskProfile {
    pub fn capture(task: &dyn SetupTask) -> Self {
        Self {
            messages: task.loading_messages(),
            requires_elevation: task.requires_elevation(),
            requires_reboot: task.requires_reboot(),
            depends_on_prerequisite: task.depends_on_prerequisite(),
            target_display_name: task.target_display_name(),
            error_notice: task.error_notice(),
            reboot_notice: task.reboot_notice(),
        }
    }

    /// A new failure notice; each raise gets its own identity
    pub fn error_notice(&self) -> ActionCenterItem {
        renew(&self.error_notice)
    }

    /// A new reboot notice
    pub fn reboot_notice(&self) -> ActionCenterItem {
        renew(&self.reboot_notice)
    }
}

fn renew(item: &ActionCenterItem) -> ActionCenterItem {
    let fresh = ActionCenterItem::new(item.title.clone(), item.severity);
    match &item.detail {
        Some(detail) => fresh.with_detail(detail.clone()),
        None => fresh,
    }
}

/// A task admitted into a batch
///
/// Records are cheap to clone; clones share the underlying task. A failed
/// record is moved into the next pass when the batch is retried.
#[derive(Clone)]
pub struct TaskRecord {
    /// Stable index assigned when the batch is created
    pub index: usize,
    /// The task itself
    pub task: Arc<dyn SetupTask>,
    /// Contract values captured at admission
    pub profile: TaskProfile,
    /// Line shown while the task runs
    pub executing_message: String,
    /// Outcome of the latest attempt, once known
    pub outcome: Option<Outcome>,
}

impl TaskRecord {
    pub fn new(index: usize, task: Arc<dyn SetupTask>) -> Self {
        let profile = TaskProfile::capture(task.as_ref());
        let executing_message = profile.messages.executing.clone();
        Self {
            index,
            task,
            profile,
            executing_message,
            outcome: None,
        }
    }

    /// Build records for a task list, indexed in order
    pub fn admit_all(tasks: impl IntoIterator<Item = Arc<dyn SetupTask>>) -> Vec<Self> {
        tasks
            .into_iter()
            .enumerate()
            .map(|(index, task)| Self::new(index, task))
            .collect()
    }

    /// Clear the previous attempt's outcome before re-running
    pub fn reset(&mut self) {
        self.outcome = None;
    }

    /// Feed text describing the latest outcome, if any
    pub fn outcome_message(&self) -> Option<&str> {
        self.outcome.map(|o| self.profile.messages.for_outcome(o))
    }
}

impl std::fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRecord")
            .field("index", &self.index)
            .field("executing_message", &self.executing_message)
            .field("outcome", &self.outcome)
            .finish()
    }
}
