//! Authorization engine shared by every enforcement surface
//!
//! A [`SecurityPolicy`] is built once at startup and never mutated, so it can be
//! shared behind an `Arc` without locking. Every check is a pure query.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::{PermissionsConfig, SecurityConfig, SecurityMode};
use crate::error::{GatewayError, GatewayResult};
use crate::policy::blocked_paths::{BlockedPath, BlockedPathIndex, GLOBAL_SCOPE};
use crate::policy::import::import_blocked_paths;
use crate::policy::masking::{MaskingRules, OutputTarget};
use crate::policy::pattern::NamePatterns;

/// Container operations guarded by a global permission switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Logs,
    Inspect,
    Stats,
    Exec,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logs => "logs",
            Self::Inspect => "inspect",
            Self::Stats => "stats",
            Self::Exec => "exec",
        }
    }
}

/// Immutable security policy
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    mode: SecurityMode,
    allowed_containers: NamePatterns,
    permissions: PermissionsConfig,
    exec_whitelist: HashMap<String, Vec<String>>,
    blocked_paths: BlockedPathIndex,
    masking: MaskingRules,
    dangerous_enabled: bool,
    dangerous_commands: HashMap<String, Vec<String>>,
}

impl SecurityPolicy {
    /// Build the policy, running blocked-path auto-import when enabled.
    ///
    /// Import failures are logged and skipped; invalid globs or masking rules
    /// are configuration errors.
    pub fn from_config(config: &SecurityConfig) -> GatewayResult<Self> {
        let mut blocked_paths = BlockedPathIndex::from_manual(&config.blocked_paths.manual);
        blocked_paths.extend(import_blocked_paths(&config.blocked_paths.auto_import));
        Self::with_blocked_paths(config, blocked_paths)
    }

    /// Build the policy around an already assembled blocked-path index
    pub fn with_blocked_paths(
        config: &SecurityConfig,
        blocked_paths: BlockedPathIndex,
    ) -> GatewayResult<Self> {
        let allowed_containers = NamePatterns::compile(&config.allowed_containers)?;
        let masking = MaskingRules::from_config(&config.output_masking)?;

        let dangerous_enabled = config.dangerously.enabled && config.mode != SecurityMode::Strict;
        if config.dangerously.enabled && !dangerous_enabled {
            warn!("Dangerous mode is configured but disabled by strict security mode");
        }

        info!(
            mode = ?config.mode,
            containers = config.allowed_containers.len(),
            blocked_paths = blocked_paths.len(),
            masking_rules = masking.len(),
            dangerous = dangerous_enabled,
            "Security policy loaded"
        );

        Ok(Self {
            mode: config.mode,
            allowed_containers,
            permissions: config.permissions.clone(),
            exec_whitelist: config.exec_whitelist.clone(),
            blocked_paths,
            masking,
            dangerous_enabled,
            dangerous_commands: config.dangerously.commands.clone(),
        })
    }

    pub fn mode(&self) -> SecurityMode {
        self.mode
    }

    pub fn dangerous_mode_enabled(&self) -> bool {
        self.dangerous_enabled
    }

    pub fn blocked_paths(&self) -> &BlockedPathIndex {
        &self.blocked_paths
    }

    /// True iff no container patterns are configured or `name` matches one
    pub fn can_access_container(&self, name: &str) -> bool {
        self.allowed_containers.is_empty() || self.allowed_containers.matches(name)
    }

    /// [`Self::can_access_container`] as a typed denial
    pub fn check_container_access(&self, name: &str) -> GatewayResult<()> {
        if self.can_access_container(name) {
            Ok(())
        } else {
            warn!(container = %name, "Container access denied");
            Err(GatewayError::denied(format!(
                "container '{}' does not match any allowed container pattern",
                name
            )))
        }
    }

    /// Whether the global switch for `operation` is on
    pub fn is_permitted(&self, operation: Operation) -> bool {
        match operation {
            Operation::Logs => self.permissions.logs,
            Operation::Inspect => self.permissions.inspect,
            Operation::Stats => self.permissions.stats,
            Operation::Exec => self.permissions.exec,
        }
    }

    /// [`Self::is_permitted`] as a typed denial
    pub fn check_permission(&self, operation: Operation) -> GatewayResult<()> {
        if self.is_permitted(operation) {
            Ok(())
        } else {
            Err(GatewayError::denied(format!(
                "{} permission is disabled",
                operation.as_str()
            )))
        }
    }

    /// The command must appear verbatim in the whitelist for `container` or `*`.
    ///
    /// A command that dangerous mode would accept yields
    /// [`GatewayError::RequiresDangerousMode`] instead of a bare denial.
    pub fn can_exec(&self, container: &str, command: &str) -> GatewayResult<()> {
        if command.trim().is_empty() {
            return Err(GatewayError::InvalidInput("empty command".to_string()));
        }

        if self.mode == SecurityMode::Permissive {
            debug!(container = %container, command = %command, "Exec allowed by permissive mode");
            return Ok(());
        }

        let scoped = self.exec_whitelist.get(container);
        let global = self.exec_whitelist.get(GLOBAL_SCOPE);
        let whitelisted = scoped
            .into_iter()
            .chain(global)
            .flatten()
            .any(|allowed| allowed == command);
        if whitelisted {
            debug!(container = %container, command = %command, "Exec allowed by whitelist");
            return Ok(());
        }

        if self.can_exec_dangerously(container, command).is_ok() {
            return Err(GatewayError::RequiresDangerousMode {
                command: command.to_string(),
            });
        }

        if scoped.is_none() && global.is_none() {
            warn!(container = %container, command = %command, "No exec whitelist for container");
            return Err(GatewayError::denied(format!(
                "no exec whitelist configured for container '{}'",
                container
            )));
        }

        warn!(container = %container, command = %command, "Exec denied: not whitelisted");
        Err(GatewayError::denied(format!(
            "command '{}' is not whitelisted for container '{}'",
            command, container
        )))
    }

    /// Dangerous mode authorizes by base command name only; arguments are
    /// restricted through path blocking by the caller.
    pub fn can_exec_dangerously(&self, container: &str, command: &str) -> GatewayResult<()> {
        if !self.dangerous_enabled {
            return Err(GatewayError::denied("dangerous mode is disabled"));
        }

        let base = command
            .split_whitespace()
            .next()
            .ok_or_else(|| GatewayError::InvalidInput("empty command".to_string()))?;

        let allowed = self
            .dangerous_commands
            .get(container)
            .into_iter()
            .chain(self.dangerous_commands.get(GLOBAL_SCOPE))
            .flatten()
            .any(|allowed| allowed == base);

        if allowed {
            debug!(container = %container, base = %base, "Exec allowed by dangerous mode");
            Ok(())
        } else {
            Err(GatewayError::denied(format!(
                "'{}' is not a dangerous-mode command for container '{}'",
                base, container
            )))
        }
    }

    /// The rule blocking `path` in `container`; container-specific rules first
    pub fn is_path_blocked(&self, container: &str, path: &str) -> Option<&BlockedPath> {
        let rule = self.blocked_paths.find(container, path);
        if let Some(rule) = rule {
            warn!(container = %container, path = %path, rule = %rule, "Path is blocked");
        }
        rule
    }

    /// Apply every masking rule flagged for `target`
    pub fn mask_output(&self, text: &str, target: OutputTarget) -> String {
        self.masking.mask(text, target)
    }
}
