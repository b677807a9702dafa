//! Host tools: discovery and execution of approved scripts, and the pipeline
//! that approves them

pub mod approval;
pub mod header;
pub mod name;
pub mod project;
pub mod registry;

pub use self::approval::{
    compare_files, ApprovalDecision, ApprovalPipeline, ApprovalPrompt, ApprovalRequest,
    ApprovalTarget, LinePrompt, SyncFailure, SyncItem, SyncReport, SyncStatus,
};
pub use self::header::{parse_header, read_header, ScriptKind, ToolHeader};
pub use self::name::validate_name;
pub use self::project::{project_id, COMMON_DIR, PROJECT_MARKER};
pub use self::registry::{approved_root, HostToolRegistry, ToolDirectory, ToolInfo, ToolSource};
