//! Container runtime seam
//!
//! The gateway never talks to the runtime before the policy has approved the
//! action; implementations only carry out already authorized operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::error::GatewayResult;

/// A container as listed by the runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub status: String,
}

/// Options for fetching container logs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogOptions {
    /// Only the last N lines
    #[serde(default)]
    pub tail: Option<usize>,
    /// Only lines newer than this timestamp or relative duration (`10m`)
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub timestamps: bool,
}

/// Combined output and exit code of a command run inside a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub output: String,
}

/// Operations the gateway needs from a container runtime.
///
/// Implementations report a missing container as `GatewayError::NotFound` and
/// an unreachable daemon as `GatewayError::ExecutionFailed`.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn list_containers(&self) -> GatewayResult<Vec<ContainerSummary>>;

    async fn logs(&self, container: &str, options: &LogOptions) -> GatewayResult<String>;

    /// One resource usage snapshot, as JSON text
    async fn stats(&self, container: &str) -> GatewayResult<String>;

    /// Full container description, as JSON text
    async fn inspect(&self, container: &str) -> GatewayResult<String>;

    /// Run `argv` inside the container, capturing combined output
    async fn exec(
        &self,
        container: &str,
        argv: &[String],
        timeout: Duration,
    ) -> GatewayResult<ExecOutput>;
}
