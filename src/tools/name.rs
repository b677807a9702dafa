//! Tool name validation shared by the registry and the approval pipeline

use crate::error::{GatewayError, GatewayResult};

/// Reject names that could escape a tool directory once joined onto it.
///
/// Must run before any filesystem path is built from an external name.
pub fn validate_name(name: &str) -> GatewayResult<()> {
    let reason = if name.is_empty() {
        Some("name must not be empty")
    } else if name.contains('/') || name.contains('\\') {
        Some("name must not contain path separators")
    } else if name.contains("..") {
        Some("name must not contain '..'")
    } else if name.contains('\0') {
        Some("name must not contain NUL")
    } else if name == "." {
        Some("name must not be '.'")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(GatewayError::InvalidInput(format!(
            "invalid tool name '{}': {}",
            name.escape_debug(),
            reason
        ))),
        None => Ok(()),
    }
}
