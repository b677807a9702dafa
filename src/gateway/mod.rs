//! Container operations: the runtime seam, its docker CLI implementation, and
//! the policy-enforcing gateway in front of it

pub mod container;
pub mod docker;
pub mod runtime;

pub use self::container::{ContainerGateway, ExecResult, FileAccess, DEFAULT_EXEC_TIMEOUT};
pub use self::docker::DockerCli;
pub use self::runtime::{ContainerRuntime, ContainerSummary, ExecOutput, LogOptions};
