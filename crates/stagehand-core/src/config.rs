//! Configuration management for Stagehand
//!
//! Two layers: [`StagehandConfig`] is the repository-level file in
//! `.stagehand/config.toml`, and [`OrchestratorConfig`] is what one batch
//! actually runs with.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Result, StagehandError};

/// Default number of retry passes over failed tasks
pub const DEFAULT_RETRY_BUDGET: u32 = 1;

/// How aggregate counters are reported across retry passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterMode {
    /// Successes from earlier passes stay in the reported totals
    #[default]
    Cumulative,
    /// Only the current pass is reported
    PerPass,
}

impl std::str::FromStr for CounterMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cumulative" => Ok(Self::Cumulative),
            "per_pass" | "per-pass" | "perpass" => Ok(Self::PerPass),
            _ => Err(format!("Invalid counter mode: {}", s)),
        }
    }
}

/// Machine a batch configures
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SetupTarget {
    /// This machine: tasks are phase-partitioned, progress is determinate
    #[default]
    Local,
    /// One remote machine: a single pre-selected task, indeterminate progress
    Remote { name: String },
}

impl SetupTarget {
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

/// Settings for one orchestrated batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Number of extra passes allowed over failed tasks
    pub retry_budget: u32,
    /// Cumulative or per-pass reporting
    pub counter_mode: CounterMode,
    /// Local or remote setup
    pub target: SetupTarget,
    /// Cap on concurrently running tasks (`None` = unbounded)
    pub max_concurrency: Option<usize>,
    /// Fail elevated tasks outright when no elevation channel exists
    pub strict_elevation: bool,
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self {
            retry_budget: DEFAULT_RETRY_BUDGET,
            counter_mode: CounterMode::default(),
            target: SetupTarget::Local,
            max_concurrency: None,
            strict_elevation: false,
        }
    }

    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    pub fn with_counter_mode(mut self, mode: CounterMode) -> Self {
        self.counter_mode = mode;
        self
    }

    pub fn with_target(mut self, target: SetupTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max.max(1));
        self
    }

    pub fn with_strict_elevation(mut self, strict: bool) -> Self {
        self.strict_elevation = strict;
        self
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Repository-level Stagehand configuration
///
/// Loaded from `.stagehand/config.toml` in the repo root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagehandConfig {
    /// Retry behavior
    #[serde(default)]
    pub retry: RetryConfig,

    /// Execution limits
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// Retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Extra passes over failed tasks
    #[serde(default = "default_retry_budget")]
    pub budget: u32,

    /// Counter reporting across passes
    #[serde(default)]
    pub counter_mode: CounterMode,
}

/// Execution settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum concurrently running tasks
    #[serde(default)]
    pub max_concurrency: Option<usize>,

    /// Fail elevated tasks when no elevation channel is supplied
    #[serde(default)]
    pub strict_elevation: bool,
}

fn default_retry_budget() -> u32 {
    DEFAULT_RETRY_BUDGET
}

impl StagehandConfig {
    /// Load configuration from `.stagehand/config.toml` or use defaults
    pub fn load_or_default(repo_root: &Path) -> Result<Self> {
        let config_path = repo_root.join(".stagehand/config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| StagehandError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Write default configuration to `.stagehand/config.toml`
    pub fn write_default(repo_root: &Path) -> Result<()> {
        let config_dir = repo_root.join(".stagehand");
        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");
        let content = toml::to_string_pretty(&Self::default()).map_err(|e| {
            StagehandError::Config(format!("Failed to serialize config: {}", e))
        })?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Build the batch configuration for a target
    pub fn orchestrator_config(&self, target: SetupTarget) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::new()
            .with_retry_budget(self.retry.budget)
            .with_counter_mode(self.retry.counter_mode)
            .with_target(target)
            .with_strict_elevation(self.execution.strict_elevation);
        if let Some(max) = self.execution.max_concurrency {
            config = config.with_max_concurrency(max);
        }
        config
    }
}

impl Default for StagehandConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            budget: default_retry_budget(),
            counter_mode: CounterMode::default(),
        }
    }
}
