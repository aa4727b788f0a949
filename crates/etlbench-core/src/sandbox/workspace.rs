//! Per-trial workspace: directory, databases, and the two capabilities.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use etlbench_store::{
    DatasetStore, OrderRecord, RenderLimits, RunContext, SOURCE_ALIAS, SOURCE_SCHEMA,
    TARGET_SCHEMA,
};

use super::error::{SandboxError, SandboxResult};
use super::tools::ToolResult;

pub const WORKSPACE_DB: &str = "workspace.db";
pub const SOURCE_DB: &str = "source.db";
pub const ARTIFACT_FILE: &str = "artifact.sql";

/// Limits applied to every fragment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Wall-clock limit per fragment (milliseconds).
    pub timeout_ms: u64,
    /// Rows rendered per result set.
    pub max_rows: usize,
    /// Characters returned per fragment.
    pub max_output_chars: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_rows: 50,
            max_output_chars: 8_000,
        }
    }
}

impl SandboxConfig {
    pub fn validate(&self) -> SandboxResult<()> {
        if self.timeout_ms == 0 {
            return Err(SandboxError::InvalidConfig(
                "timeout_ms must be positive".to_string(),
            ));
        }
        if self.max_rows == 0 || self.max_output_chars == 0 {
            return Err(SandboxError::InvalidConfig(
                "max_rows and max_output_chars must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn limits(&self) -> RenderLimits {
        RenderLimits {
            max_rows: self.max_rows,
            max_output_chars: self.max_output_chars,
        }
    }
}

/// Isolated execution surface owned by one trial.
pub struct Sandbox {
    root: PathBuf,
    store: Arc<Mutex<DatasetStore>>,
    config: SandboxConfig,
    submission: Option<String>,
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("root", &self.root)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Sandbox {
    /// Build a fresh workspace under `root`, wiping anything already there.
    ///
    /// `sample` seeds the read-only source; `run_context` fills
    /// `etl_context` so the agent can exercise its job as the grader will.
    #[instrument(skip(sample, config), fields(root = %root.display(), sample = sample.len()))]
    pub fn open(
        root: &Path,
        config: SandboxConfig,
        sample: &[OrderRecord],
        run_context: RunContext,
    ) -> SandboxResult<Self> {
        config.validate()?;
        if root.exists() {
            warn!("Workspace directory exists, wiping it");
            std::fs::remove_dir_all(root)?;
        }
        std::fs::create_dir_all(root)?;

        let source_path = root.join(SOURCE_DB);
        {
            let mut source = DatasetStore::open(&source_path)?;
            source.init_schema(SOURCE_SCHEMA)?;
            source.insert_orders(sample)?;
        }

        let mut store = DatasetStore::open(&root.join(WORKSPACE_DB))?;
        store.init_schema(TARGET_SCHEMA)?;
        store.attach_read_only(&source_path, SOURCE_ALIAS)?;
        store.set_run_context(&run_context)?;
        store.lock_down();

        info!("Sandbox workspace ready");
        Ok(Self {
            root: root.to_path_buf(),
            store: Arc::new(Mutex::new(store)),
            config,
            submission: None,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_closed(&self) -> bool {
        self.submission.is_some()
    }

    pub fn submission(&self) -> Option<&str> {
        self.submission.as_deref()
    }

    /// Run an SQL fragment on the persistent connection.
    ///
    /// Never fails: syntax errors, constraint violations, timeouts, denied
    /// capabilities and a closed sandbox all come back as error results.
    pub async fn execute_code(&self, code: &str) -> ToolResult {
        if self.is_closed() {
            return ToolResult::error(SandboxError::Closed.to_string());
        }

        let store = Arc::clone(&self.store);
        let code = code.to_string();
        let limits = self.config.limits();
        let timeout = Duration::from_millis(self.config.timeout_ms);

        let joined = tokio::task::spawn_blocking(move || {
            let guard = store
                .lock()
                .map_err(|_| "workspace connection poisoned by an earlier panic".to_string())?;
            let output = guard.run_fragment(&code, &limits, timeout);
            output.map_err(|e| e.to_string())
        })
        .await;

        match joined {
            Ok(Ok(output)) => ToolResult::ok(output),
            Ok(Err(message)) => {
                debug!(error = %message, "Fragment failed");
                ToolResult::error(message)
            }
            Err(join) => ToolResult::error(format!("execution worker failed: {join}")),
        }
    }

    /// Record the answer, persist it as `artifact.sql`, and close.
    pub fn submit(&mut self, answer: &str) -> SandboxResult<PathBuf> {
        if self.is_closed() {
            return Err(SandboxError::Closed);
        }
        let path = self.root.join(ARTIFACT_FILE);
        std::fs::write(&path, answer)?;
        self.submission = Some(answer.to_string());
        info!(path = %path.display(), "Answer submitted, sandbox closed");
        Ok(path)
    }

    /// Names of objects currently in the workspace schema.
    pub async fn user_objects(&self) -> SandboxResult<Vec<String>> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let guard = store
                .lock()
                .map_err(|_| SandboxError::Worker("workspace connection poisoned".to_string()))?;
            let names = guard.user_objects()?;
            Ok(names)
        })
        .await
        .map_err(|e| SandboxError::Worker(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn run_context() -> RunContext {
        RunContext::new(
            NaiveDate::from_ymd_opt(2023, 2, 2)
                .unwrap()
                .and_hms_opt(23, 0, 0)
                .unwrap(),
        )
    }

    #[test]
    fn test_config_validation() {
        assert!(SandboxConfig::default().validate().is_ok());
        let bad = SandboxConfig {
            timeout_ms: 0,
            ..SandboxConfig::default()
        };
        assert!(matches!(bad.validate(), Err(SandboxError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_closed_sandbox_rejects_code() {
        let dir = tempfile::tempdir().unwrap();
        let mut sandbox = Sandbox::open(
            &dir.path().join("ws"),
            SandboxConfig::default(),
            &[],
            run_context(),
        )
        .unwrap();

        let path = sandbox.submit("SELECT 1;").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "SELECT 1;");
        assert!(sandbox.is_closed());

        let result = sandbox.execute_code("SELECT 1").await;
        assert!(result.is_error);
        assert!(result.payload.contains("closed"));
        assert!(matches!(sandbox.submit("again"), Err(SandboxError::Closed)));
    }

    #[tokio::test]
    async fn test_run_context_visible() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::open(dir.path(), SandboxConfig::default(), &[], run_context())
            .unwrap();
        let result = sandbox
            .execute_code("SELECT run_date FROM etl_context")
            .await;
        assert!(!result.is_error, "{}", result.payload);
        assert!(result.payload.contains("2023-02-02"));
    }
}
