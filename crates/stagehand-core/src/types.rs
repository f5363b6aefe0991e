//! Core type definitions for Stagehand orchestration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal result of one task execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    SucceededNeedsReboot,
    Failed,
}

impl Outcome {
    /// Both success variants count as success
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed)
    }

    /// Severity used for feed entries describing this outcome
    pub fn severity(&self) -> Severity {
        match self {
            Self::Succeeded => Severity::Success,
            Self::SucceededNeedsReboot => Severity::Warning,
            Self::Failed => Severity::Error,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::SucceededNeedsReboot => write!(f, "succeeded_needs_reboot"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "succeeded" | "success" => Ok(Self::Succeeded),
            "succeeded_needs_reboot" | "needs_reboot" | "needs-reboot" => {
                Ok(Self::SucceededNeedsReboot)
            }
            "failed" | "failure" => Ok(Self::Failed),
            _ => Err(format!("Invalid outcome: {}", s)),
        }
    }
}

/// Severity of a feed entry or action center notice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
    Success,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Success => write!(f, "success"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "success" => Ok(Self::Success),
            _ => Err(format!("Invalid severity: {}", s)),
        }
    }
}

/// Display text a task provides for each lifecycle phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingMessages {
    /// Shown while the task runs
    pub executing: String,
    /// Shown when the task succeeded
    pub finished: String,
    /// Shown when the task failed
    pub error: String,
    /// Shown when the task succeeded but a reboot is required
    pub needs_reboot: String,
}

impl LoadingMessages {
    pub fn new(
        executing: impl Into<String>,
        finished: impl Into<String>,
        error: impl Into<String>,
        needs_reboot: impl Into<String>,
    ) -> Self {
        Self {
            executing: executing.into(),
            finished: finished.into(),
            error: error.into(),
            needs_reboot: needs_reboot.into(),
        }
    }

    /// Derive the four messages from a short task label
    pub fn for_label(label: &str) -> Self {
        Self::new(
            format!("{}...", label),
            format!("{}: done", label),
            format!("{}: failed", label),
            format!("{}: done, restart required", label),
        )
    }

    /// Text of the "finished" feed line for an outcome
    pub fn for_outcome(&self, outcome: Outcome) -> &str {
        match outcome {
            Outcome::Succeeded => &self.finished,
            Outcome::SucceededNeedsReboot => &self.needs_reboot,
            Outcome::Failed => &self.error,
        }
    }
}

/// Whether an action center notice is being added or removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionRequestKind {
    Add,
    Remove,
}

/// A notice shown in the action center next to the progress feed
///
/// Identity is the `id`; two notices with the same text are still distinct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCenterItem {
    pub id: Uuid,
    pub title: String,
    pub detail: Option<String>,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

impl ActionCenterItem {
    pub fn new(title: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            detail: None,
            severity,
            created_at: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Error notice for a failed task
    pub fn error(title: impl Into<String>) -> Self {
        Self::new(title, Severity::Error)
    }

    /// Persistent reboot notice for a task that needs a restart
    pub fn reboot(title: impl Into<String>) -> Self {
        Self::new(title, Severity::Warning)
    }
}

/// Identifier of one orchestrated batch, used to correlate logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "batch-{}", &self.0.to_string()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_parse_and_display() {
        for outcome in [
            Outcome::Succeeded,
            Outcome::SucceededNeedsReboot,
            Outcome::Failed,
        ] {
            let parsed: Outcome = outcome.to_string().parse().unwrap();
            assert_eq!(parsed, outcome);
        }
        assert!("exploded".parse::<Outcome>().is_err());
    }

    #[test]
    fn test_outcome_severity() {
        assert_eq!(Outcome::Succeeded.severity(), Severity::Success);
        assert_eq!(Outcome::SucceededNeedsReboot.severity(), Severity::Warning);
        assert_eq!(Outcome::Failed.severity(), Severity::Error);
        assert!(Outcome::SucceededNeedsReboot.is_success());
        assert!(!Outcome::Failed.is_success());
    }

    #[test]
    fn test_loading_messages_for_outcome() {
        let messages = LoadingMessages::for_label("Installing Git");
        assert_eq!(messages.executing, "Installing Git...");
        assert_eq!(messages.for_outcome(Outcome::Succeeded), "Installing Git: done");
        assert_eq!(messages.for_outcome(Outcome::Failed), "Installing Git: failed");
        assert!(messages
            .for_outcome(Outcome::SucceededNeedsReboot)
            .contains("restart"));
    }

    #[test]
    fn test_action_center_items_are_distinct() {
        let a = ActionCenterItem::error("Clone failed");
        let b = ActionCenterItem::error("Clone failed");
        assert_ne!(a, b);
        assert_eq!(a.severity, Severity::Error);

        let detailed = ActionCenterItem::reboot("Restart required").with_detail("Hyper-V");
        assert_eq!(detailed.detail.as_deref(), Some("Hyper-V"));
        assert_eq!(detailed.severity, Severity::Warning);
    }

    #[test]
    fn test_batch_id_display() {
        let id = BatchId::new();
        let shown = id.to_string();
        assert!(shown.starts_with("batch-"));
        assert_eq!(shown.len(), "batch-".len() + 8);
    }
}
