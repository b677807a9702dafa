//! Timeout-bounded child process execution

use serde::Serialize;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, warn};

use crate::error::{GatewayError, GatewayResult};

/// Captured result of a finished process. A non-zero exit code is a normal
/// outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout followed by stderr
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}{}", self.stdout, self.stderr),
        }
    }
}

/// Run `cmd` to completion, killing it once `limit` elapses.
///
/// `operation` names the process in logs and errors.
pub async fn run_with_timeout(
    mut cmd: Command,
    operation: &str,
    limit: Duration,
) -> GatewayResult<ProcessOutput> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        error!("Failed to spawn '{}': {}", operation, e);
        GatewayError::execution_failed(operation, format!("failed to spawn: {}", e))
    })?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| GatewayError::execution_failed(operation, "missing stdout pipe"))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| GatewayError::execution_failed(operation, "missing stderr pipe"))?;

    let stdout_task = tokio::spawn(async move {
        let mut buffer = Vec::new();
        stdout_pipe.read_to_end(&mut buffer).await.map(|_| buffer)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buffer = Vec::new();
        stderr_pipe.read_to_end(&mut buffer).await.map(|_| buffer)
    });

    let status = match timeout(limit, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            error!("Waiting for '{}' failed: {}", operation, e);
            return Err(GatewayError::execution_failed(operation, e.to_string()));
        }
        Err(_) => {
            warn!("'{}' timed out after {:?}, killing it", operation, limit);
            if let Err(e) = child.start_kill() {
                warn!("Failed to kill '{}': {}", operation, e);
            }
            let _ = child.wait().await;
            stdout_task.abort();
            stderr_task.abort();
            return Err(GatewayError::timeout(operation, limit));
        }
    };

    let stdout = stdout_task.await.ok().and_then(Result::ok).unwrap_or_default();
    let stderr = stderr_task.await.ok().and_then(Result::ok).unwrap_or_default();
    let exit_code = status.code().unwrap_or(-1);

    debug!("'{}' exited with code {}", operation, exit_code);

    Ok(ProcessOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&stdout).to_string(),
        stderr: String::from_utf8_lossy(&stderr).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err >&2; exit 3"]);

        let output = run_with_timeout(cmd, "sh", Duration::from_secs(5)).await.unwrap();
        assert_eq!(output.exit_code, 3);
        assert!(!output.success());
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.combined(), "out\nerr\n");
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let mut cmd = Command::new("sleep");
        cmd.arg("10");

        let started = std::time::Instant::now();
        let err = run_with_timeout(cmd, "sleep 10", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let cmd = Command::new("definitely-not-a-real-binary-42");
        let err = run_with_timeout(cmd, "missing", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ExecutionFailed { .. }));
    }
}
