//! Docker CLI backed container runtime

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::Duration;
use tracing::debug;

use super::runtime::{ContainerRuntime, ContainerSummary, ExecOutput, LogOptions};
use crate::error::{GatewayError, GatewayResult};
use crate::host::{run_with_timeout, ProcessOutput};

/// Default limit for read-only docker calls (`ps`, `logs`, `inspect`, `stats`)
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime that shells out to the `docker` binary
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    query_timeout: Duration,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    /// Create a new runtime using `binary` (`docker`, `podman`, or a full path)
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    async fn run(&self, args: &[String], limit: Duration) -> GatewayResult<ProcessOutput> {
        let operation = format!("{} {}", self.binary, args.first().map(String::as_str).unwrap_or(""));
        debug!(binary = %self.binary, ?args, "Running container runtime command");

        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        run_with_timeout(cmd, &operation, limit).await
    }

    /// Run a query and map a failed exit to a runtime error
    async fn query(&self, container: Option<&str>, args: Vec<String>) -> GatewayResult<String> {
        let output = self.run(&args, self.query_timeout).await?;
        if output.success() {
            return Ok(output.stdout);
        }
        Err(runtime_error(&args[0], container, &output))
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn list_containers(&self) -> GatewayResult<Vec<ContainerSummary>> {
        let stdout = self
            .query(None, strings(&["ps", "-a", "--no-trunc", "--format", "{{json .}}"]))
            .await?;
        parse_ps_output(&stdout)
    }

    async fn logs(&self, container: &str, options: &LogOptions) -> GatewayResult<String> {
        let mut args = strings(&["logs"]);
        if let Some(tail) = options.tail {
            args.push("--tail".to_string());
            args.push(tail.to_string());
        }
        if let Some(since) = &options.since {
            args.push("--since".to_string());
            args.push(since.clone());
        }
        if options.timestamps {
            args.push("--timestamps".to_string());
        }
        args.push(container.to_string());

        // docker logs replays the container's stderr on our stderr
        let output = self.run(&args, self.query_timeout).await?;
        if !output.success() {
            return Err(runtime_error("logs", Some(container), &output));
        }
        Ok(output.combined())
    }

    async fn stats(&self, container: &str) -> GatewayResult<String> {
        let stdout = self
            .query(
                Some(container),
                strings(&["stats", "--no-stream", "--format", "{{json .}}", container]),
            )
            .await?;
        Ok(stdout.trim().to_string())
    }

    async fn inspect(&self, container: &str) -> GatewayResult<String> {
        let stdout = self
            .query(Some(container), strings(&["inspect", "--type", "container", container]))
            .await?;
        Ok(stdout.trim().to_string())
    }

    async fn exec(
        &self,
        container: &str,
        argv: &[String],
        timeout: Duration,
    ) -> GatewayResult<ExecOutput> {
        let mut args = strings(&["exec", container]);
        args.extend(argv.iter().cloned());

        let output = self.run(&args, timeout).await?;
        if !output.success() && is_runtime_failure(&output.stderr) {
            return Err(runtime_error("exec", Some(container), &output));
        }

        Ok(ExecOutput {
            exit_code: i64::from(output.exit_code),
            output: output.combined(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct PsLine {
    #[serde(rename = "ID", default)]
    id: String,
    #[serde(rename = "Names", default)]
    names: String,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Status", default)]
    status: String,
}

fn parse_ps_output(stdout: &str) -> GatewayResult<Vec<ContainerSummary>> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let ps: PsLine = serde_json::from_str(line)?;
            // Names is comma separated when a container has aliases
            let name = ps.names.split(',').next().unwrap_or_default().to_string();
            Ok(ContainerSummary {
                id: ps.id,
                name,
                image: ps.image,
                state: ps.state,
                status: ps.status,
            })
        })
        .collect()
}

fn is_runtime_failure(stderr: &str) -> bool {
    stderr.contains("No such container")
        || stderr.contains("Error response from daemon")
        || stderr.contains("Cannot connect to the Docker daemon")
}

fn runtime_error(subcommand: &str, container: Option<&str>, output: &ProcessOutput) -> GatewayError {
    let stderr = output.stderr.trim();
    match container {
        Some(name) if stderr.contains("No such container") || stderr.contains("No such object") => {
            GatewayError::not_found("Container", name)
        }
        _ => GatewayError::execution_failed(
            format!("docker {}", subcommand),
            if stderr.is_empty() {
                format!("exited with code {}", output.exit_code)
            } else {
                stderr.to_string()
            },
        ),
    }
}

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}
