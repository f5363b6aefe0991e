//! Terminal rendering of orchestrator events

use stagehand_core::Severity;
use stagehand_orchestrator::{BatchSummary, EntryId, OrchestratorEvent, ProgressDisplay};
use std::collections::HashSet;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

/// Consumes the event stream until every sender is gone
pub async fn render_events(mut rx: UnboundedReceiver<OrchestratorEvent>, quiet: bool) {
    let mut seen: HashSet<EntryId> = HashSet::new();

    while let Some(event) = rx.recv().await {
        if quiet {
            debug!(?event, "Orchestrator event");
            continue;
        }
        if let Some(line) = render(&event, &mut seen) {
            println!("{}", line);
        }
    }
}

fn render(event: &OrchestratorEvent, seen: &mut HashSet<EntryId>) -> Option<String> {
    match event {
        OrchestratorEvent::MessageAdded { entry, .. } => {
            // A settled entry is re-inserted under its old id; the finished
            // line that follows already says how it ended
            if !seen.insert(entry.id) {
                return None;
            }
            let prefix = if entry.in_progress {
                ".."
            } else {
                marker(entry.severity)
            };
            Some(format!("  {} {}", prefix, entry.text))
        }
        OrchestratorEvent::ProgressChanged(ProgressDisplay::Determinate { started, total }) => {
            (*started > 0).then(|| format!("Executing task {} of {}", started, total))
        }
        OrchestratorEvent::ProgressChanged(ProgressDisplay::Indeterminate) => {
            Some("Executing...".to_string())
        }
        OrchestratorEvent::SetupTargetChanged { name } => Some(format!("Setting up {}", name)),
        OrchestratorEvent::ActionCenterItemAdded(item) => Some(match &item.detail {
            Some(detail) => format!("  {} {} ({})", marker(item.severity), item.title, detail),
            None => format!("  {} {}", marker(item.severity), item.title),
        }),
        OrchestratorEvent::RetryOffered { failed } => {
            Some(format!("{} task(s) failed; a retry is available", failed))
        }
        OrchestratorEvent::RetriesExhausted { failed } => {
            Some(format!("Out of retries; {} task(s) still failing", failed))
        }
        OrchestratorEvent::BatchFinished(summary) => Some(summary_line(summary)),
        OrchestratorEvent::MessageRemoved { .. }
        | OrchestratorEvent::ActionCenterItemRemoved(_)
        | OrchestratorEvent::FailureCountChanged { .. } => None,
    }
}

fn marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "-",
        Severity::Success => "+",
        Severity::Warning => "!",
        Severity::Error => "x",
    }
}

pub fn summary_line(summary: &BatchSummary) -> String {
    let counters = &summary.counters;
    format!(
        "{}: {} succeeded ({} need a restart), {} failed after {} retry pass(es)",
        summary.batch_id,
        counters.succeeded_total(),
        counters.succeeded_needs_reboot,
        counters.failed,
        summary.retry_cycles
    )
}
