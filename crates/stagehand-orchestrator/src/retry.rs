//! Pure state machine for the retry cycle
//!
//! `transition(state, event, budget) -> (state, actions)` has no I/O; the
//! orchestrator executes the returned actions. Presentation flags such as
//! "show the retry button" are derived from the current state instead of
//! being stored separately.
//!
//! Invalid transitions are rejected with an error and the caller keeps its
//! previous state.

use stagehand_core::{Result, StagehandError};

/// Retry controller state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    /// No batch started yet
    Idle,
    /// A pass is executing
    Running { retries_used: u32, tasks: usize },
    /// Failures remain and a retry may be requested
    AwaitingRetryDecision { retries_used: u32, failed: usize },
    /// Terminal
    Finished {
        unresolved: usize,
        retries_exhausted: bool,
    },
}

/// Events driving the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Start the initial pass
    Start { task_count: usize },
    /// Every task of the current pass produced an outcome
    PassDrained { failed: usize },
    /// The presentation asked to retry the failed tasks
    RetryRequested,
    /// The presentation accepted the failures and moved on
    Dismissed,
}

/// Side effects for the orchestrator to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run a pass; retry passes are a single phase of the failed tasks
    RunPass { retry: bool },
    /// Expose the failed set for an explicit retry
    OfferRetry { failed: usize },
    /// Surface that no retries remain
    AnnounceRetriesExhausted { failed: usize },
    /// The batch is over
    FinishBatch,
    /// Log activity
    LogActivity { message: String },
}

/// Pure transition function
pub fn transition(state: State, event: Event, budget: u32) -> Result<(State, Vec<Action>)> {
    match (state, event) {
        (State::Idle, Event::Start { task_count: 0 }) => Ok((
            State::Finished {
                unresolved: 0,
                retries_exhausted: false,
            },
            vec![
                Action::LogActivity {
                    message: "No tasks to execute".to_string(),
                },
                Action::FinishBatch,
            ],
        )),

        (State::Idle, Event::Start { task_count }) => Ok((
            State::Running {
                retries_used: 0,
                tasks: task_count,
            },
            vec![
                Action::LogActivity {
                    message: format!("Starting {} tasks", task_count),
                },
                Action::RunPass { retry: false },
            ],
        )),

        (State::Running { .. }, Event::PassDrained { failed: 0 }) => Ok((
            State::Finished {
                unresolved: 0,
                retries_exhausted: false,
            },
            vec![
                Action::LogActivity {
                    message: "All tasks succeeded".to_string(),
                },
                Action::FinishBatch,
            ],
        )),

        (State::Running { retries_used, .. }, Event::PassDrained { failed }) => {
            if retries_used >= budget {
                Ok((
                    State::Finished {
                        unresolved: failed,
                        retries_exhausted: true,
                    },
                    vec![
                        Action::LogActivity {
                            message: format!("Retry budget spent; {} tasks failed", failed),
                        },
                        Action::AnnounceRetriesExhausted { failed },
                        Action::FinishBatch,
                    ],
                ))
            } else {
                Ok((
                    State::AwaitingRetryDecision {
                        retries_used,
                        failed,
                    },
                    vec![
                        Action::LogActivity {
                            message: format!("{} tasks failed; retry available", failed),
                        },
                        Action::OfferRetry { failed },
                    ],
                ))
            }
        }

        (
            State::AwaitingRetryDecision {
                retries_used,
                failed,
            },
            Event::RetryRequested,
        ) => Ok((
            State::Running {
                retries_used: retries_used + 1,
                tasks: failed,
            },
            vec![
                Action::LogActivity {
                    message: format!("Retrying {} failed tasks", failed),
                },
                Action::RunPass { retry: true },
            ],
        )),

        (State::AwaitingRetryDecision { failed, .. }, Event::Dismissed) => Ok((
            State::Finished {
                unresolved: failed,
                retries_exhausted: false,
            },
            vec![
                Action::LogActivity {
                    message: format!("Continuing with {} failed tasks", failed),
                },
                Action::FinishBatch,
            ],
        )),

        (state, event) => Err(StagehandError::InvalidTransition(format!(
            "{:?} cannot handle event {:?}",
            state, event
        ))),
    }
}

/// Stateful wrapper around [`transition`]
#[derive(Debug, Clone)]
pub struct RetryController {
    state: State,
    budget: u32,
}

impl RetryController {
    pub fn new(budget: u32) -> Self {
        Self {
            state: State::Idle,
            budget,
        }
    }

    /// Apply an event; on error the state is left untouched
    pub fn apply(&mut self, event: Event) -> Result<Vec<Action>> {
        let (next, actions) = transition(self.state.clone(), event, self.budget)?;
        self.state = next;
        Ok(actions)
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished { .. })
    }

    pub fn show_retry_button(&self) -> bool {
        matches!(self.state, State::AwaitingRetryDecision { .. })
    }

    pub fn show_out_of_retries_banner(&self) -> bool {
        matches!(
            self.state,
            State::Finished {
                retries_exhausted: true,
                ..
            }
        )
    }
}
