//! Host-side gateway giving a sandboxed AI coding assistant least-privilege
//! access to sibling containers, host commands and approved host tools.
//!
//! Every enforcement surface consults one immutable [`SecurityPolicy`]:
//!
//! - [`ContainerGateway`] for logs, stats, inspect, exec and file reads
//! - [`HostCommandExecutor`] for whitelisted host commands
//! - [`HostToolRegistry`] for approved host tool scripts
//!
//! [`ApprovalPipeline`] runs out of band and promotes staging scripts into the
//! approved store the registry reads.

pub mod config;
pub mod error;
pub mod gateway;
pub mod host;
pub mod logging;
pub mod platform_dirs;
pub mod policy;
pub mod tools;

pub use self::config::{
    GatewayConfig, HostCommandsConfig, HostToolsConfig, HostToolsMode, LoggingConfig,
    SecurityConfig, SecurityMode,
};
pub use self::error::{GatewayError, GatewayResult};
pub use self::gateway::{
    ContainerGateway, ContainerRuntime, ContainerSummary, DockerCli, ExecResult, FileAccess,
    LogOptions,
};
pub use self::host::{HostCommandExecutor, ProcessOutput};
pub use self::policy::{BlockedPath, BlockedPathIndex, OutputTarget, SecurityPolicy};
pub use self::tools::{
    ApprovalPipeline, ApprovalPrompt, HostToolRegistry, LinePrompt, SyncReport, SyncStatus,
    ToolInfo,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{
        ContainerGateway, ContainerRuntime, GatewayConfig, GatewayError, GatewayResult,
        HostCommandExecutor, HostToolRegistry, SecurityPolicy,
    };
}
