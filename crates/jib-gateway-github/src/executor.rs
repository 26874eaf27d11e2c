use std::path::PathBuf;
use std::time::Duration;

/// Outcome of a child process run.
///
/// A non-zero exit is data, not an error; handlers decide what a failure
/// means and relay stdout/stderr to the caller. `returncode` is `-1` when the
/// child never produced an exit status (spawn failure or timeout).
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub returncode: i32,
}

impl ExecOutcome {
    pub fn timed_out(timeout: Duration) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: format!("timed out after {}s", timeout.as_secs()),
            returncode: -1,
        }
    }

    pub fn spawn_failed(err: &std::io::Error) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: err.to_string(),
            returncode: -1,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.returncode == -1 && self.stderr.starts_with("timed out after ")
    }

    /// Response-body representation.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": self.success,
            "stdout": self.stdout,
            "stderr": self.stderr,
            "returncode": self.returncode,
        })
    }
}

/// Abstraction over `gh` CLI execution for testability.
///
/// Production code uses [`RealGhExecutor`], tests use mockall-generated mocks.
/// The executor receives the complete child environment and never inherits
/// the gateway's own.
#[allow(async_fn_in_trait)]
pub trait GhExecutor: Send + Sync {
    async fn exec(
        &self,
        args: &[String],
        timeout: Duration,
        cwd: Option<PathBuf>,
        env: &[(String, String)],
    ) -> ExecOutcome;
}

const GH_CLI: &str = "/usr/bin/gh";

/// Real `gh` CLI executor.
///
/// The child is killed when the timeout elapses; it never outlives the
/// request that spawned it.
pub struct RealGhExecutor;

impl GhExecutor for RealGhExecutor {
    async fn exec(
        &self,
        args: &[String],
        timeout: Duration,
        cwd: Option<PathBuf>,
        env: &[(String, String)],
    ) -> ExecOutcome {
        let mut command = tokio::process::Command::new(GH_CLI);
        command
            .args(args)
            .env_clear()
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        run_with_timeout(command, timeout).await
    }
}

/// Run a prepared command, capturing output, killing the child on timeout.
pub(crate) async fn run_with_timeout(
    mut command: tokio::process::Command,
    timeout: Duration,
) -> ExecOutcome {
    use std::process::Stdio;

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        // Dropping the output future on timeout kills the child (kill_on_drop).
        Err(_elapsed) => return ExecOutcome::timed_out(timeout),
        Ok(Err(err)) => return ExecOutcome::spawn_failed(&err),
        Ok(Ok(output)) => output,
    };

    ExecOutcome {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        returncode: output.status.code().unwrap_or(-1),
    }
}
