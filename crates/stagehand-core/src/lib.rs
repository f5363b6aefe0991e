//! # stagehand-core
//!
//! Core types for the Stagehand setup-task orchestrator.
//!
//! A setup batch is a list of heterogeneous tasks (package installs, dev drive
//! provisioning, repository clones, ...) that run concurrently in dependency
//! phases while a presentation layer renders their progress.
//!
//! ## Core Paradigm
//!
//! - Tasks only expose a capability contract ([`SetupTask`])
//! - Tasks report progress through a narrow write-only sink ([`MessageSink`])
//! - Elevated work goes through an opaque [`ElevationChannel`]
//! - One task's failure never aborts the batch

pub mod config;
mod error;
mod task;
mod types;

pub use config::{CounterMode, OrchestratorConfig, SetupTarget, StagehandConfig};
pub use error::{Result, StagehandError};
pub use task::{ElevationChannel, MessageSink, SetupTask};
pub use types::*;
