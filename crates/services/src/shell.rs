//! Local shell-based task executor.
//!
//! Fetches the task body from the catalog, stages it in a temporary file and
//! runs it through the configured shell with positional arguments. Parameter
//! values are passed in the task's declared order, falling back to declared
//! defaults for unbound optional parameters.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::CapabilityError;
use crate::traits::{TaskCatalog, TaskExecutor};
use crate::types::{ExecutionOutcome, ExecutionRequest, WorkerTask};

/// Executes worker tasks locally by spawning their shell content.
pub struct ShellExecutor {
    catalog: Arc<dyn TaskCatalog>,
    shell: String,
    deadline: Option<Duration>,
}

impl ShellExecutor {
    pub fn new(catalog: Arc<dyn TaskCatalog>) -> Self {
        Self {
            catalog,
            shell: "bash".to_string(),
            deadline: None,
        }
    }

    /// Override the shell binary (default: `bash`).
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Kill the task process after this duration.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Positional arguments in the task's declared parameter order.
    fn positional_args(task: &WorkerTask, request: &ExecutionRequest) -> Vec<String> {
        task.param_specs
            .iter()
            .filter_map(|spec| {
                request
                    .parameters
                    .get(&spec.name)
                    .cloned()
                    .or_else(|| spec.default_value.clone())
            })
            .collect()
    }

    async fn run_script(
        &self,
        task: &WorkerTask,
        args: &[String],
    ) -> Result<ExecutionOutcome, CapabilityError> {
        // The temp file must outlive the child process.
        let mut script = NamedTempFile::new()?;
        script.write_all(task.content.as_bytes())?;
        script.flush()?;

        let mut cmd = Command::new(&self.shell);
        cmd.arg(script.path()).args(args);
        cmd.kill_on_drop(true);

        let wait = cmd.output();
        let output = match self.deadline {
            Some(deadline) => match timeout(deadline, wait).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(task = %task.name, "task execution timed out");
                    return Err(CapabilityError::Timeout(deadline.as_secs()));
                }
            },
            None => wait.await?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if output.status.success() {
            info!(task = %task.name, "task executed successfully");
            let transcript = if stdout.is_empty() {
                "Task executed successfully with no output.".to_string()
            } else {
                stdout
            };
            Ok(ExecutionOutcome::success(transcript))
        } else {
            let combined = [stdout, stderr]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            warn!(task = %task.name, code = ?output.status.code(), "task failed");
            Ok(ExecutionOutcome::error(combined))
        }
    }
}

#[async_trait]
impl TaskExecutor for ShellExecutor {
    async fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionOutcome, CapabilityError> {
        let task = self.catalog.get(&request.task_id).await?;
        if task.content.trim().is_empty() {
            return Err(CapabilityError::Process(format!(
                "task '{}' has no executable content",
                task.name
            )));
        }
        let args = Self::positional_args(&task, request);
        self.run_script(&task, &args).await
    }
}
