//! Dependency-phase partitioning
//!
//! Dependencies are a single flag, not a graph: tasks that wait for the
//! prerequisite subsystem run after every task that does not. There is no
//! cycle detection because two fixed phases cannot form a cycle.

use crate::record::TaskRecord;

/// A set of tasks that are safe to run concurrently
#[derive(Debug, Clone)]
pub struct Phase {
    pub number: u32,
    pub name: String,
    pub records: Vec<TaskRecord>,
}

impl Phase {
    pub fn new(number: u32, name: impl Into<String>, records: Vec<TaskRecord>) -> Self {
        Self {
            number,
            name: name.into(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Split tasks into independent and prerequisite-dependent phases
///
/// Empty phases are dropped, so an empty input yields no phases at all.
pub fn partition(records: Vec<TaskRecord>) -> Vec<Phase> {
    let (dependent, independent): (Vec<_>, Vec<_>) = records
        .into_iter()
        .partition(|r| r.profile.depends_on_prerequisite);

    [
        Phase::new(0, "independent", independent),
        Phase::new(1, "prerequisite-dependent", dependent),
    ]
    .into_iter()
    .filter(|p| !p.is_empty())
    .collect()
}

/// Wrap tasks in a single phase without looking at their dependencies
///
/// Used for retry passes and remote setups.
pub fn single_phase(records: Vec<TaskRecord>, name: &str) -> Vec<Phase> {
    if records.is_empty() {
        Vec::new()
    } else {
        vec![Phase::new(0, name, records)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use stagehand_core::{LoadingMessages, MessageSink, Outcome, Result, SetupTask};
    use std::sync::Arc;

    struct FlagTask {
        dependent: bool,
    }

    #[async_trait]
    impl SetupTask for FlagTask {
        fn loading_messages(&self) -> LoadingMessages {
            LoadingMessages::for_label("flag")
        }

        fn depends_on_prerequisite(&self) -> bool {
            self.dependent
        }

        async fn execute(&self, _sink: &dyn MessageSink) -> Result<Outcome> {
            Ok(Outcome::Succeeded)
        }
    }

    fn records(flags: &[bool]) -> Vec<TaskRecord> {
        TaskRecord::admit_all(
            flags
                .iter()
                .map(|&dependent| Arc::new(FlagTask { dependent }) as Arc<dyn SetupTask>),
        )
    }

    fn indices(phase: &Phase) -> Vec<usize> {
        phase.records.iter().map(|r| r.index).collect()
    }

    #[test]
    fn test_empty_yields_no_phases() {
        assert!(partition(Vec::new()).is_empty());
        assert!(single_phase(Vec::new(), "retry").is_empty());
    }

    #[test]
    fn test_dependent_tasks_go_last() {
        let phases = partition(records(&[false, true, false, false]));

        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].name, "independent");
        assert_eq!(indices(&phases[0]), vec![0, 2, 3]);
        assert_eq!(phases[1].name, "prerequisite-dependent");
        assert_eq!(indices(&phases[1]), vec![1]);
    }

    #[test]
    fn test_all_independent_is_one_phase() {
        let phases = partition(records(&[false, false, false]));
        assert_eq!(phases.len(), 1);
        assert_eq!(phases[0].len(), 3);
    }

    #[test]
    fn test_all_dependent_skips_empty_first_phase() {
        let phases = partition(records(&[true, true]));
        assert_eq!(phases.len(), 1);
        assert_eq!(phases[0].number, 1);
    }

    #[test]
    fn test_single_phase_ignores_dependencies() {
        let phases = single_phase(records(&[true, false]), "retry");
        assert_eq!(phases.len(), 1);
        assert_eq!(phases[0].name, "retry");
        assert_eq!(indices(&phases[0]), vec![0, 1]);
    }
}
