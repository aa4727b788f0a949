//! Run configuration: TOML file, then CLI overrides.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::{EvalError, Result};
use crate::orchestrator::ExecutionMode;
use crate::sandbox::SandboxConfig;
use crate::scenario::ScenarioConfig;

/// `[engine]`: reasoning engine endpoint and generation limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub api_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub anthropic_version: String,
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.anthropic.com".to_string(),
            model: "claude-haiku-4-5".to_string(),
            max_tokens: 4000,
            anthropic_version: "2023-06-01".to_string(),
            request_timeout_secs: 120,
        }
    }
}

/// `[driver]`: conversation budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DriverConfig {
    pub max_steps: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { max_steps: 15 }
    }
}

/// Orchestration mode as written in config files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModeName {
    #[default]
    Sequential,
    Concurrent,
}

/// `[orchestrator]`: trial count, mode, output location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub trials: usize,
    pub mode: ModeName,
    pub max_concurrency: usize,
    pub output_dir: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            trials: 10,
            mode: ModeName::Sequential,
            max_concurrency: 2,
            output_dir: PathBuf::from("sandbox"),
        }
    }
}

impl OrchestratorConfig {
    pub fn execution_mode(&self) -> ExecutionMode {
        match self.mode {
            ModeName::Sequential => ExecutionMode::Sequential,
            ModeName::Concurrent => ExecutionMode::Concurrent {
                max_concurrency: self.max_concurrency,
            },
        }
    }
}

/// Complete harness configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EvalConfig {
    pub engine: EngineConfig,
    pub driver: DriverConfig,
    pub sandbox: SandboxConfig,
    pub scenario: ScenarioConfig,
    pub orchestrator: OrchestratorConfig,
}

impl EvalConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| EvalError::InvalidConfig(e.to_string()))
    }

    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                Self::from_toml_str(&text)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.model.trim().is_empty() {
            return Err(EvalError::InvalidConfig("engine.model is empty".to_string()));
        }
        if self.engine.max_tokens == 0 {
            return Err(EvalError::InvalidConfig(
                "engine.max_tokens must be positive".to_string(),
            ));
        }
        if self.driver.max_steps == 0 {
            return Err(EvalError::InvalidConfig(
                "driver.max_steps must be positive".to_string(),
            ));
        }
        if self.orchestrator.trials == 0 {
            return Err(EvalError::InvalidConfig(
                "orchestrator.trials must be positive".to_string(),
            ));
        }
        if self.orchestrator.max_concurrency == 0 {
            return Err(EvalError::InvalidConfig(
                "orchestrator.max_concurrency must be positive".to_string(),
            ));
        }
        self.sandbox.validate()?;
        self.scenario.validate()?;
        Ok(())
    }
}
