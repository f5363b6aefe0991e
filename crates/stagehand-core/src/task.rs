//! Capability contract every setup task satisfies

use async_trait::async_trait;

use crate::types::{ActionCenterItem, ActionRequestKind, LoadingMessages, Outcome, Severity};
use crate::Result;

/// Write-only reporting interface handed to a task while it executes
///
/// Tasks never see the orchestrator itself; they can only append freeform
/// progress lines and add or remove their own action center notices.
pub trait MessageSink: Send + Sync {
    /// Append a freeform line ahead of the still-running entries
    fn add_message(&self, text: String, severity: Severity);

    /// Add or remove a notice in the action center
    fn update_action_center(&self, item: ActionCenterItem, kind: ActionRequestKind);
}

/// Opaque channel to a process that runs work with administrator rights
pub trait ElevationChannel: Send + Sync {
    /// Short description used in logs
    fn describe(&self) -> String;
}

/// A unit of setup work
///
/// `execute` returns `Err` (or panics) to signal failure; the orchestrator
/// turns both into [`Outcome::Failed`] at the task boundary.
#[async_trait]
pub trait SetupTask: Send + Sync {
    /// Text for each lifecycle phase of the task
    fn loading_messages(&self) -> LoadingMessages;

    /// Must run through the elevation channel when one is available
    fn requires_elevation(&self) -> bool {
        false
    }

    /// A successful run leaves the machine needing a restart
    fn requires_reboot(&self) -> bool {
        false
    }

    /// Must wait for the prerequisite subsystem (e.g. a dev drive) to exist
    fn depends_on_prerequisite(&self) -> bool {
        false
    }

    /// Name of the machine being configured, for remote setups
    fn target_display_name(&self) -> Option<String> {
        None
    }

    /// Action center notice raised when the task fails
    fn error_notice(&self) -> ActionCenterItem {
        ActionCenterItem::error(self.loading_messages().error)
    }

    /// Action center notice raised when the task needs a reboot
    fn reboot_notice(&self) -> ActionCenterItem {
        ActionCenterItem::reboot(self.loading_messages().needs_reboot)
    }

    /// Run the task normally
    async fn execute(&self, sink: &dyn MessageSink) -> Result<Outcome>;

    /// Run the task through an elevation channel
    ///
    /// Tasks that never require elevation can rely on the default, which
    /// runs the normal operation.
    async fn execute_elevated(
        &self,
        channel: &dyn ElevationChannel,
        sink: &dyn MessageSink,
    ) -> Result<Outcome> {
        tracing::debug!(channel = %channel.describe(), "Task has no elevated variant");
        self.execute(sink).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        lines: Mutex<Vec<(String, Severity)>>,
    }

    impl MessageSink for RecordingSink {
        fn add_message(&self, text: String, severity: Severity) {
            self.lines.lock().unwrap().push((text, severity));
        }

        fn update_action_center(&self, _item: ActionCenterItem, _kind: ActionRequestKind) {}
    }

    struct NoopChannel;

    impl ElevationChannel for NoopChannel {
        fn describe(&self) -> String {
            "noop".to_string()
        }
    }

    struct PlainTask;

    #[async_trait]
    impl SetupTask for PlainTask {
        fn loading_messages(&self) -> LoadingMessages {
            LoadingMessages::for_label("Plain")
        }

        async fn execute(&self, sink: &dyn MessageSink) -> Result<Outcome> {
            sink.add_message("plain ran".to_string(), Severity::Info);
            Ok(Outcome::Succeeded)
        }
    }

    #[tokio::test]
    async fn test_default_elevated_runs_normal_operation() {
        let sink = RecordingSink {
            lines: Mutex::new(Vec::new()),
        };
        let outcome = PlainTask
            .execute_elevated(&NoopChannel, &sink)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Succeeded);
        assert_eq!(sink.lines.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_default_contract_flags() {
        let task = PlainTask;
        assert!(!task.requires_elevation());
        assert!(!task.requires_reboot());
        assert!(!task.depends_on_prerequisite());
        assert!(task.target_display_name().is_none());
        assert_eq!(task.error_notice().title, "Plain: failed");
        assert_eq!(task.reboot_notice().severity, Severity::Warning);
    }
}
