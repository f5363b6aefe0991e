//! Scripted setup plans
//!
//! A plan is a TOML file listing tasks whose behavior is scripted: how long
//! they take, how many attempts fail, and which contract flags they carry.
//!
//! ```toml
//! target = "devbox"          # optional; runs the first task remotely
//!
//! [[task]]
//! name = "Install Git"
//! duration_ms = 400
//! requires_reboot = true
//!
//! [[task]]
//! name = "Clone repo onto Dev Drive"
//! depends_on_prerequisite = true
//! fail_attempts = 1
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stagehand_core::{
    ElevationChannel, LoadingMessages, MessageSink, Outcome, SetupTarget, SetupTask, Severity,
    StagehandError,
};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A whole plan file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Remote machine name; absent means local setup
    #[serde(default)]
    pub target: Option<String>,

    #[serde(default, rename = "task")]
    pub tasks: Vec<PlannedTask>,
}

/// One scripted task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedTask {
    pub name: String,

    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,

    /// Fail the first N attempts
    #[serde(default)]
    pub fail_attempts: u32,

    /// Panic instead of returning an error on a failing attempt
    #[serde(default)]
    pub panic: bool,

    #[serde(default)]
    pub requires_reboot: bool,

    #[serde(default)]
    pub depends_on_prerequisite: bool,

    #[serde(default)]
    pub requires_elevation: bool,

    /// Display name of the machine this task configures
    #[serde(default)]
    pub target: Option<String>,
}

fn default_duration_ms() -> u64 {
    250
}

impl Plan {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse plan")
    }

    pub fn setup_target(&self) -> SetupTarget {
        match &self.target {
            Some(name) => SetupTarget::Remote { name: name.clone() },
            None => SetupTarget::Local,
        }
    }

    pub fn into_tasks(self) -> Vec<Arc<dyn SetupTask>> {
        self.tasks
            .into_iter()
            .map(|planned| Arc::new(ScriptedTask::new(planned)) as Arc<dyn SetupTask>)
            .collect()
    }
}

/// Task that sleeps, then fails or succeeds as its plan entry says
pub struct ScriptedTask {
    plan: PlannedTask,
    attempts: AtomicU32,
}

impl ScriptedTask {
    pub fn new(plan: PlannedTask) -> Self {
        Self {
            plan,
            attempts: AtomicU32::new(0),
        }
    }

    async fn attempt(&self, sink: &dyn MessageSink) -> stagehand_core::Result<Outcome> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(self.plan.duration_ms)).await;

        if attempt <= self.plan.fail_attempts {
            if self.plan.panic {
                panic!("{} crashed on attempt {}", self.plan.name, attempt);
            }
            return Err(StagehandError::TaskExecution(format!(
                "{} failed on attempt {}",
                self.plan.name, attempt
            )));
        }

        if attempt > 1 {
            sink.add_message(
                format!("{} recovered on attempt {}", self.plan.name, attempt),
                Severity::Info,
            );
        }
        Ok(Outcome::Succeeded)
    }
}

#[async_trait]
impl SetupTask for ScriptedTask {
    fn loading_messages(&self) -> LoadingMessages {
        LoadingMessages::for_label(&self.plan.name)
    }

    fn requires_elevation(&self) -> bool {
        self.plan.requires_elevation
    }

    fn requires_reboot(&self) -> bool {
        self.plan.requires_reboot
    }

    fn depends_on_prerequisite(&self) -> bool {
        self.plan.depends_on_prerequisite
    }

    fn target_display_name(&self) -> Option<String> {
        self.plan.target.clone()
    }

    async fn execute(&self, sink: &dyn MessageSink) -> stagehand_core::Result<Outcome> {
        self.attempt(sink).await
    }

    async fn execute_elevated(
        &self,
        channel: &dyn ElevationChannel,
        sink: &dyn MessageSink,
    ) -> stagehand_core::Result<Outcome> {
        sink.add_message(
            format!("{} running through {}", self.plan.name, channel.describe()),
            Severity::Info,
        );
        self.attempt(sink).await
    }
}

/// Elevation channel standing in for an elevated helper process
pub struct LocalElevation;

impl ElevationChannel for LocalElevation {
    fn describe(&self) -> String {
        "local elevated session".to_string()
    }
}
