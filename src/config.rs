//! TOML configuration for the gateway

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{GatewayError, GatewayResult};

/// Main gateway configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Container access policy
    #[serde(default)]
    pub security: SecurityConfig,

    /// Host command execution
    #[serde(default)]
    pub host_commands: HostCommandsConfig,

    /// Host tool scripts
    #[serde(default)]
    pub host_tools: HostToolsConfig,

    /// Logging output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Overall strictness of the container policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Dangerous mode is forced off
    Strict,
    /// Everything as configured
    #[default]
    Moderate,
    /// Any command may be executed in an accessible container
    Permissive,
}

/// Container security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub mode: SecurityMode,

    /// Glob patterns of container names; empty means every container
    #[serde(default)]
    pub allowed_containers: Vec<String>,

    /// Per-operation permission switches
    #[serde(default)]
    pub permissions: PermissionsConfig,

    /// Container name (or "*") to verbatim command list
    #[serde(default)]
    pub exec_whitelist: HashMap<String, Vec<String>>,

    #[serde(default)]
    pub blocked_paths: BlockedPathsConfig,

    #[serde(default)]
    pub output_masking: OutputMaskingConfig,

    #[serde(default)]
    pub dangerously: DangerousConfig,
}

/// Per-operation permission switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsConfig {
    #[serde(default = "default_true")]
    pub logs: bool,
    #[serde(default = "default_true")]
    pub inspect: bool,
    #[serde(default = "default_true")]
    pub stats: bool,
    #[serde(default = "default_true")]
    pub exec: bool,
}

/// Blocked path sources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockedPathsConfig {
    /// Container name (or "*") to path patterns
    #[serde(default)]
    pub manual: HashMap<String, Vec<String>>,

    #[serde(default)]
    pub auto_import: AutoImportConfig,
}

/// Construction-time import of blocked paths from workspace files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoImportConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Root to scan; compose files are searched below it
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,

    /// Explicit compose files, scanned in addition to discovered ones
    #[serde(default)]
    pub compose_files: Vec<PathBuf>,

    /// Read `.aiignore` style files and assistant settings files
    #[serde(default = "default_true")]
    pub scan_ai_ignore_files: bool,

    /// Directory depth limit for compose file discovery
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

/// Output masking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputMaskingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Rules applied in declaration order; empty selects the built-in set
    #[serde(default)]
    pub rules: Vec<MaskingRuleConfig>,
}

/// A single masking rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskingRuleConfig {
    pub pattern: String,

    #[serde(default = "default_replacement")]
    pub replacement: String,

    #[serde(default)]
    pub apply_to: ApplyToConfig,
}

/// Output targets a masking rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyToConfig {
    #[serde(default = "default_true")]
    pub logs: bool,
    #[serde(default = "default_true")]
    pub exec: bool,
    #[serde(default = "default_true")]
    pub inspect: bool,
}

/// Container dangerous mode
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DangerousConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Container name (or "*") to base command names
    #[serde(default)]
    pub commands: HashMap<String, Vec<String>>,
}

/// Host command execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostCommandsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Working directory for commands; defaults to the workspace
    #[serde(default)]
    pub workdir: Option<PathBuf>,

    #[serde(default = "default_command_timeout")]
    pub timeout_secs: u64,

    /// Base command to argument patterns ("exact" or "prefix *")
    #[serde(default)]
    pub whitelist: HashMap<String, Vec<String>>,

    /// Base command to argument patterns; always wins over the whitelist
    #[serde(default)]
    pub deny: HashMap<String, Vec<String>>,

    #[serde(default)]
    pub dangerously: HostDangerousConfig,

    /// Container scope whose blocked paths also apply to host arguments;
    /// `None` checks global entries only
    #[serde(default)]
    pub blocked_path_scope: Option<String>,
}

/// Host dangerous mode
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostDangerousConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Base command to argument patterns (empty list allows any arguments);
    /// the "*" key lists base commands allowed with any arguments
    #[serde(default)]
    pub commands: HashMap<String, Vec<String>>,
}

/// How host tools are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostToolsMode {
    /// Read tools straight from the configured directories
    Legacy,
    /// Only run tools that went through the approval pipeline
    #[default]
    Secure,
}

/// Host tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostToolsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub mode: HostToolsMode,

    /// Staging directories, relative to the workspace unless absolute
    #[serde(default = "default_tool_directories")]
    pub directories: Vec<PathBuf>,

    /// Root of the approved store; defaults to the platform data directory
    #[serde(default)]
    pub approved_dir: Option<PathBuf>,

    /// Also resolve tools from `<approved_dir>/_common`
    #[serde(default = "default_true")]
    pub common: bool,

    /// Resolve unapproved staging tools first (development only)
    #[serde(default)]
    pub dev_mode: bool,

    #[serde(default = "default_extensions")]
    pub allowed_extensions: Vec<String>,

    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write daily-rolling logs into this directory
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Format file logs as JSON lines
    #[serde(default = "default_true")]
    pub json: bool,
}

impl GatewayConfig {
    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Save configuration to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Read, parse and validate a configuration file
    pub fn load(path: &Path) -> GatewayResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&raw).map_err(|e| {
            GatewayError::invalid_config(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> GatewayResult<()> {
        for pattern in &self.security.allowed_containers {
            if pattern.trim().is_empty() {
                return Err(GatewayError::invalid_config(
                    "allowed_containers contains an empty pattern",
                ));
            }
        }

        for (base, _) in self.host_commands.whitelist.iter().chain(&self.host_commands.deny) {
            if base.is_empty() || base.contains(char::is_whitespace) {
                return Err(GatewayError::invalid_config(format!(
                    "Invalid host command key: '{}'",
                    base
                )));
            }
        }

        if self.host_commands.timeout_secs == 0 || self.host_tools.timeout_secs == 0 {
            return Err(GatewayError::invalid_config("timeouts must be at least one second"));
        }

        for ext in &self.host_tools.allowed_extensions {
            if ext.is_empty() || ext.starts_with('.') {
                return Err(GatewayError::invalid_config(format!(
                    "Tool extension must be given without a dot: '{}'",
                    ext
                )));
            }
        }

        Ok(())
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            mode: SecurityMode::default(),
            allowed_containers: Vec::new(),
            permissions: PermissionsConfig::default(),
            exec_whitelist: HashMap::new(),
            blocked_paths: BlockedPathsConfig::default(),
            output_masking: OutputMaskingConfig::default(),
            dangerously: DangerousConfig::default(),
        }
    }
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            logs: true,
            inspect: true,
            stats: true,
            exec: true,
        }
    }
}

impl Default for AutoImportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            workspace_root: None,
            compose_files: Vec::new(),
            scan_ai_ignore_files: true,
            max_depth: default_max_depth(),
        }
    }
}

impl Default for OutputMaskingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rules: Vec::new(),
        }
    }
}

impl Default for ApplyToConfig {
    fn default() -> Self {
        Self {
            logs: true,
            exec: true,
            inspect: true,
        }
    }
}

impl Default for HostCommandsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            workdir: None,
            timeout_secs: default_command_timeout(),
            whitelist: HashMap::new(),
            deny: HashMap::new(),
            dangerously: HostDangerousConfig::default(),
            blocked_path_scope: None,
        }
    }
}

impl Default for HostToolsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: HostToolsMode::default(),
            directories: default_tool_directories(),
            approved_dir: None,
            common: true,
            dev_mode: false,
            allowed_extensions: default_extensions(),
            timeout_secs: default_tool_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            json: true,
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_max_depth() -> usize {
    3
}

fn default_replacement() -> String {
    "[MASKED]".to_string()
}

fn default_command_timeout() -> u64 {
    60
}

fn default_tool_timeout() -> u64 {
    120
}

fn default_tool_directories() -> Vec<PathBuf> {
    vec![PathBuf::from(".sandbox/host-tools")]
}

fn default_extensions() -> Vec<String> {
    vec!["sh".to_string(), "py".to_string(), "go".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}
