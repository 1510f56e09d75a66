use super::types::{ArgValue, WorkerResult};
use super::Worker;
use serde_json::json;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

/// Maximum shell command execution time before kill.
const SHELL_TIMEOUT_SECS: u64 = 60;
/// Maximum captured output size in bytes (1 MB).
const MAX_OUTPUT_BYTES: usize = 1_048_576;
/// Environment variables safe to pass to shell commands.
/// Only functional variables are included -- never API keys or secrets.
const SAFE_ENV_VARS: &[&str] = &[
    "PATH", "HOME", "TERM", "LANG", "LC_ALL", "LC_CTYPE", "USER", "SHELL",
];

/// Shell command executor. Safety gating happens in the engine before
/// dispatch; this worker's job is hygienic execution: scrubbed environment,
/// workspace-local TMPDIR, timeout, output truncation, and an
/// exit-code-bearing result so failures classify as recoverable.
pub struct ShellWorker {
    workspace_dir: PathBuf,
}

impl ShellWorker {
    pub fn new(workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace_dir: workspace_dir.into(),
        }
    }

    async fn run_command(&self, command: &str) -> anyhow::Result<WorkerResult> {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.workspace_dir)
            .env_clear();

        for var in SAFE_ENV_VARS {
            if let Ok(val) = std::env::var(var) {
                cmd.env(var, val);
            }
        }

        // Keep temp files inside the workspace.
        let controlled_tmp = self.workspace_dir.join(".opspilot-tmp");
        if !controlled_tmp.exists() {
            std::fs::create_dir_all(&controlled_tmp)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&controlled_tmp, std::fs::Permissions::from_mode(0o700))?;
            }
        }
        cmd.env("TMPDIR", &controlled_tmp);

        let result =
            tokio::time::timeout(Duration::from_secs(SHELL_TIMEOUT_SECS), cmd.output()).await;

        match result {
            Ok(Ok(output)) => {
                let mut stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let mut stderr = String::from_utf8_lossy(&output.stderr).to_string();
                truncate_output(&mut stdout);
                truncate_output(&mut stderr);

                let exit_code = output.status.code().unwrap_or(-1);
                let success = output.status.success();
                let message = if success {
                    stdout.clone()
                } else if stderr.is_empty() {
                    format!("command exited with code {exit_code}")
                } else {
                    stderr.clone()
                };

                Ok(WorkerResult {
                    success,
                    data: Some(json!({
                        "exit_code": exit_code,
                        "stdout": stdout,
                        "stderr": stderr,
                    })),
                    message,
                    task_completed: false,
                    simulated: false,
                })
            }
            Ok(Err(e)) => Ok(WorkerResult::fail(format!(
                "Failed to execute command: {e}"
            ))),
            Err(_) => Ok(WorkerResult::fail(format!(
                "Command timed out after {SHELL_TIMEOUT_SECS}s and was killed"
            ))),
        }
    }
}

fn truncate_output(text: &mut String) {
    if text.len() > MAX_OUTPUT_BYTES {
        let mut end = MAX_OUTPUT_BYTES;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
        text.push_str("\n... [output truncated at 1MB]");
    }
}

fn is_dry_run(args: &BTreeMap<String, ArgValue>) -> bool {
    matches!(args.get("dry_run"), Some(ArgValue::Bool(true)))
}

impl Worker for ShellWorker {
    fn name(&self) -> &str {
        "shell"
    }

    fn get_capabilities(&self) -> Vec<String> {
        vec!["execute_command".to_string()]
    }

    fn execute<'a>(
        &'a self,
        action: &'a str,
        args: &'a BTreeMap<String, ArgValue>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<WorkerResult>> + Send + 'a>> {
        Box::pin(async move {
            if action != "execute_command" {
                anyhow::bail!("shell worker does not support action {action}");
            }

            let command = args
                .get("command")
                .and_then(ArgValue::as_str)
                .ok_or_else(|| anyhow::anyhow!("Missing 'command' parameter"))?;

            if is_dry_run(args) {
                return Ok(
                    WorkerResult::ok(format!("dry-run: would execute `{command}`")).simulated(),
                );
            }

            self.run_command(command).await
        })
    }
}
