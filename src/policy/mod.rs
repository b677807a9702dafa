//! Policy engine: pattern matching, blocked paths, output masking and the
//! immutable [`SecurityPolicy`] consulted by every enforcement surface.

pub mod blocked_paths;
pub mod import;
pub mod masking;
pub mod pattern;
pub mod security;

pub use self::blocked_paths::{BlockedPath, BlockedPathIndex, PathSource, GLOBAL_SCOPE};
pub use self::masking::{MaskingRule, MaskingRules, OutputTarget};
pub use self::pattern::{ArgumentPattern, NamePatterns, PathPattern};
pub use self::security::{Operation, SecurityPolicy};
