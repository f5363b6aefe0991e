//! Ordered progress feed
//!
//! Entries for running tasks always sit at the end of the list. Everything
//! that settles (finished tasks, freeform messages) is inserted at the
//! boundary just before that trailing run, so settled lines stay in the
//! order they settled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stagehand_core::{Outcome, Result, Severity, StagehandError};

/// Stable identifier of a feed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub u64);

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entry-{}", self.0)
    }
}

/// One line of the progress feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub id: EntryId,
    pub text: String,
    pub severity: Severity,
    pub in_progress: bool,
    /// Batch index of the task this line belongs to, if any
    pub task_index: Option<usize>,
    pub created_at: DateTime<Utc>,
}

/// A single structural change to the feed, in the order it was applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedChange {
    Inserted { position: usize, entry: MessageEntry },
    Removed { position: usize, id: EntryId },
}

/// The ordered list of progress entries
#[derive(Debug, Default)]
pub struct MessageFeed {
    entries: Vec<MessageEntry>,
    live: usize,
    next_id: u64,
}

impl MessageFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an in-progress entry for a task that just started
    pub fn begin(&mut self, text: impl Into<String>, task_index: usize) -> (EntryId, FeedChange) {
        let entry = self.make_entry(text.into(), Severity::Info, true, Some(task_index));
        let id = entry.id;
        let position = self.entries.len();
        self.entries.push(entry.clone());
        self.live += 1;
        (id, FeedChange::Inserted { position, entry })
    }

    /// Settle a running entry
    ///
    /// The entry is moved to the boundary with the outcome's severity, then a
    /// second "finished" line carrying `finished_text` is inserted after it.
    pub fn settle(
        &mut self,
        id: EntryId,
        outcome: Outcome,
        finished_text: impl Into<String>,
    ) -> Result<Vec<FeedChange>> {
        let position = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| {
                StagehandError::InvariantViolation(format!("{} is not in the feed", id))
            })?;

        if !self.entries[position].in_progress {
            return Err(StagehandError::InvariantViolation(format!(
                "{} was already settled",
                id
            )));
        }

        let mut changes = Vec::with_capacity(3);

        let mut entry = self.entries.remove(position);
        changes.push(FeedChange::Removed { position, id });

        self.live -= 1;
        entry.in_progress = false;
        entry.severity = outcome.severity();
        let task_index = entry.task_index;
        changes.push(self.insert_at_boundary(entry));

        let finished = self.make_entry(finished_text.into(), outcome.severity(), false, task_index);
        changes.push(self.insert_at_boundary(finished));

        Ok(changes)
    }

    /// Insert a freeform settled line ahead of the running entries
    pub fn add(&mut self, text: impl Into<String>, severity: Severity) -> FeedChange {
        let entry = self.make_entry(text.into(), severity, false, None);
        self.insert_at_boundary(entry)
    }

    /// Index where the next settled entry goes
    pub fn boundary(&self) -> usize {
        self.entries.len() - self.live
    }

    /// Number of entries still in progress
    pub fn in_progress_count(&self) -> usize {
        self.live
    }

    pub fn entries(&self) -> &[MessageEntry] {
        &self.entries
    }

    /// Settled entries, in settlement order
    pub fn settled(&self) -> &[MessageEntry] {
        &self.entries[..self.boundary()]
    }

    /// Entries still running
    pub fn running(&self) -> &[MessageEntry] {
        &self.entries[self.boundary()..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when in-progress entries form exactly the trailing `live` entries
    pub fn is_consistent(&self) -> bool {
        let boundary = self.boundary();
        self.entries[..boundary].iter().all(|e| !e.in_progress)
            && self.entries[boundary..].iter().all(|e| e.in_progress)
    }

    fn insert_at_boundary(&mut self, entry: MessageEntry) -> FeedChange {
        let position = self.boundary();
        self.entries.insert(position, entry.clone());
        FeedChange::Inserted { position, entry }
    }

    fn make_entry(
        &mut self,
        text: String,
        severity: Severity,
        in_progress: bool,
        task_index: Option<usize>,
    ) -> MessageEntry {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        MessageEntry {
            id,
            text,
            severity,
            in_progress,
            task_index,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(feed: &MessageFeed) -> Vec<&str> {
        feed.entries().iter().map(|e| e.text.as_str()).collect()
    }

    #[test]
    fn test_begin_appends_in_progress() {
        let mut feed = MessageFeed::new();
        let (id, change) = feed.begin("Installing Git...", 0);

        assert_eq!(feed.len(), 1);
        assert_eq!(feed.in_progress_count(), 1);
        assert_eq!(feed.boundary(), 0);
        assert!(feed.entries()[0].in_progress);
        assert!(matches!(change, FeedChange::Inserted { position: 0, .. }));
        assert_eq!(feed.entries()[0].id, id);
    }

    #[test]
    fn test_settle_moves_ahead_of_running() {
        let mut feed = MessageFeed::new();
        let (a, _) = feed.begin("A...", 0);
        let (_b, _) = feed.begin("B...", 1);
        let (_c, _) = feed.begin("C...", 2);

        let changes = feed.settle(a, Outcome::Succeeded, "A done").unwrap();

        assert_eq!(texts(&feed), vec!["A...", "A done", "B...", "C..."]);
        assert_eq!(feed.in_progress_count(), 2);
        assert!(feed.is_consistent());
        assert_eq!(changes.len(), 3);
        assert!(matches!(changes[0], FeedChange::Removed { position: 0, .. }));
        assert!(matches!(changes[1], FeedChange::Inserted { position: 0, .. }));
        assert!(matches!(changes[2], FeedChange::Inserted { position: 1, .. }));
    }

    #[test]
    fn test_settle_last_started_first() {
        let mut feed = MessageFeed::new();
        let (_a, _) = feed.begin("A...", 0);
        let (b, _) = feed.begin("B...", 1);

        feed.settle(b, Outcome::Failed, "B failed").unwrap();

        assert_eq!(texts(&feed), vec!["B...", "B failed", "A..."]);
        let settled = feed.settled();
        assert_eq!(settled[0].severity, Severity::Error);
        assert_eq!(settled[1].severity, Severity::Error);
        assert!(!settled[0].in_progress);
        assert_eq!(feed.running()[0].text, "A...");
    }

    #[test]
    fn test_settled_entries_keep_settlement_order() {
        let mut feed = MessageFeed::new();
        let (a, _) = feed.begin("A...", 0);
        let (b, _) = feed.begin("B...", 1);
        let (c, _) = feed.begin("C...", 2);

        feed.settle(c, Outcome::Succeeded, "C done").unwrap();
        feed.settle(a, Outcome::SucceededNeedsReboot, "A reboot").unwrap();
        feed.add("note", Severity::Info);
        feed.settle(b, Outcome::Failed, "B failed").unwrap();

        assert_eq!(
            texts(&feed),
            vec!["C...", "C done", "A...", "A reboot", "note", "B...", "B failed"]
        );
        assert_eq!(feed.in_progress_count(), 0);
        assert!(feed.is_consistent());
    }

    #[test]
    fn test_add_lands_before_running_entries() {
        let mut feed = MessageFeed::new();
        feed.begin("A...", 0);
        feed.begin("B...", 1);

        let change = feed.add("Dev drive created", Severity::Success);

        assert_eq!(texts(&feed), vec!["Dev drive created", "A...", "B..."]);
        assert!(matches!(change, FeedChange::Inserted { position: 0, .. }));
        assert!(feed.is_consistent());
    }

    #[test]
    fn test_double_settle_is_invariant_violation() {
        let mut feed = MessageFeed::new();
        let (a, _) = feed.begin("A...", 0);
        feed.settle(a, Outcome::Succeeded, "A done").unwrap();

        let err = feed.settle(a, Outcome::Succeeded, "A done").unwrap_err();
        assert!(err.is_invariant_violation());
        assert_eq!(feed.len(), 2);
        assert_eq!(feed.in_progress_count(), 0);
    }

    #[test]
    fn test_unknown_entry_is_invariant_violation() {
        let mut feed = MessageFeed::new();
        let err = feed
            .settle(EntryId(42), Outcome::Failed, "nope")
            .unwrap_err();
        assert!(err.is_invariant_violation());
    }
}
