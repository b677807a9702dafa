//! Error handling for the gateway

use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway error types
///
/// Policy refusals are always reported through [`GatewayError::PermissionDenied`]
/// or [`GatewayError::RequiresDangerousMode`], never as an empty success.
#[derive(Debug)]
pub enum GatewayError {
    /// The security policy refused the operation
    PermissionDenied {
        reason: String,
        /// Pattern or rule that caused the refusal, when there is one
        rule: Option<String>,
    },

    /// The command is only permitted with the dangerous-mode flag set
    RequiresDangerousMode { command: String },

    /// Container, tool or directory does not exist
    NotFound { kind: &'static str, name: String },

    /// Malformed quoting or tool header
    ParseError(String),

    /// Operation exceeded its time budget and was killed
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// OS-level or runtime-level execution problem
    ExecutionFailed { operation: String, message: String },

    /// Externally supplied value failed validation
    InvalidInput(String),

    /// Invalid configuration
    InvalidConfiguration(String),

    /// Serialization/deserialization error
    SerializationError(serde_json::Error),

    /// IO error
    IoError(std::io::Error),
}

impl GatewayError {
    /// Create a permission denied error without a matching rule
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            reason: reason.into(),
            rule: None,
        }
    }

    /// Create a permission denied error naming the rule that matched
    pub fn denied_by(reason: impl Into<String>, rule: impl Into<String>) -> Self {
        Self::PermissionDenied {
            reason: reason.into(),
            rule: Some(rule.into()),
        }
    }

    /// Create a not found error
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create an execution failed error
    pub fn execution_failed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// True for policy refusals, as opposed to broken infrastructure
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied { .. } | Self::RequiresDangerousMode { .. }
        )
    }

    /// The rule that caused a refusal, if any
    pub fn rule(&self) -> Option<&str> {
        match self {
            Self::PermissionDenied { rule, .. } => rule.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied { reason, rule: Some(rule) } => {
                write!(f, "Permission denied: {} (rule: {})", reason, rule)
            }
            Self::PermissionDenied { reason, rule: None } => {
                write!(f, "Permission denied: {}", reason)
            }
            Self::RequiresDangerousMode { command } => write!(
                f,
                "Command '{}' is not whitelisted; it is only allowed with dangerously=true",
                command
            ),
            Self::NotFound { kind, name } => write!(f, "{} not found: {}", kind, name),
            Self::ParseError(msg) => write!(f, "Parse error: {}", msg),
            Self::Timeout { operation, duration } => {
                write!(f, "'{}' timed out after {:?}", operation, duration)
            }
            Self::ExecutionFailed { operation, message } => {
                write!(f, "'{}' failed: {}", operation, message)
            }
            Self::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Self::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            Self::SerializationError(e) => write!(f, "Serialization error: {}", e),
            Self::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl Error for GatewayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SerializationError(e) => Some(e),
            Self::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(error: serde_json::Error) -> Self {
        Self::SerializationError(error)
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(error: std::io::Error) -> Self {
        Self::IoError(error)
    }
}
