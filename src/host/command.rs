//! Whitelisted host command execution

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::config::HostCommandsConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::host::process::{run_with_timeout, ProcessOutput};
use crate::host::tokenize::{find_shell_metacharacter, tokenize, ParsedCommand};
use crate::policy::pattern::{find_argument_match, path_argument};
use crate::policy::{SecurityPolicy, GLOBAL_SCOPE};

/// Which allow-list accepted a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizedBy {
    Whitelist,
    DangerousMode,
}

/// A host command that passed every check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedCommand {
    pub parsed: ParsedCommand,
    pub authorized_by: AuthorizedBy,
    /// `base pattern` of the rule that matched
    pub rule: String,
}

/// Parses, authorizes and runs host OS commands
pub struct HostCommandExecutor {
    config: HostCommandsConfig,
    workdir: PathBuf,
    policy: Arc<SecurityPolicy>,
}

impl HostCommandExecutor {
    /// Create an executor; commands run in `config.workdir` or else `workspace`
    pub fn new(config: HostCommandsConfig, workspace: &Path, policy: Arc<SecurityPolicy>) -> Self {
        let workdir = config
            .workdir
            .clone()
            .unwrap_or_else(|| workspace.to_path_buf());
        Self {
            config,
            workdir,
            policy,
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Run every check without executing anything
    pub fn authorize(&self, command: &str, dangerously: bool) -> GatewayResult<AuthorizedCommand> {
        if !self.config.enabled {
            return Err(GatewayError::denied("host command execution is disabled"));
        }

        if let Some(meta) = find_shell_metacharacter(command) {
            warn!(command = %command, meta = %meta.escape_debug(), "Host command rejected");
            return Err(GatewayError::denied_by(
                "shell metacharacters are not allowed in host commands",
                meta.escape_debug().to_string(),
            ));
        }

        let parsed = tokenize(command)?;

        if let Some(token) = parsed.tokens().find(|token| token.contains("..")) {
            warn!(command = %command, "Host command rejected: path traversal");
            return Err(GatewayError::denied_by(
                "path traversal ('..') is not allowed",
                token.to_string(),
            ));
        }

        let args = parsed.argument_string();

        if let Some(denied) = self
            .config
            .deny
            .get(&parsed.base)
            .and_then(|patterns| find_argument_match(patterns, &args))
        {
            warn!(command = %command, rule = %denied, "Host command matches deny rule");
            return Err(GatewayError::denied_by(
                format!("command '{}' is explicitly denied", command),
                format!("{} {}", parsed.base, denied),
            ));
        }

        let whitelisted = self
            .config
            .whitelist
            .get(&parsed.base)
            .and_then(|patterns| find_argument_match(patterns, &args))
            .map(|pattern| format!("{} {}", parsed.base, pattern));
        let dangerous = self.dangerous_rule(&parsed, &args);

        let (authorized_by, rule) = match (whitelisted, dangerous, dangerously) {
            (Some(rule), _, _) => (AuthorizedBy::Whitelist, rule),
            (None, Some(rule), true) => (AuthorizedBy::DangerousMode, rule),
            (None, Some(_), false) => {
                info!(command = %command, "Host command requires dangerous mode");
                return Err(GatewayError::RequiresDangerousMode {
                    command: command.to_string(),
                });
            }
            (None, None, _) => {
                warn!(command = %command, "Host command not whitelisted");
                return Err(GatewayError::denied(format!(
                    "command '{}' is not whitelisted",
                    command
                )));
            }
        };

        self.check_path_arguments(&parsed)?;

        debug!(command = %command, rule = %rule, by = ?authorized_by, "Host command authorized");
        Ok(AuthorizedCommand {
            parsed,
            authorized_by,
            rule,
        })
    }

    /// Authorize and run `command`, bounded by the configured timeout
    pub async fn execute(&self, command: &str, dangerously: bool) -> GatewayResult<ProcessOutput> {
        let authorized = self.authorize(command, dangerously)?;

        let mut cmd = Command::new(&authorized.parsed.base);
        cmd.args(&authorized.parsed.args);
        cmd.current_dir(&self.workdir);

        info!(command = %command, workdir = %self.workdir.display(), "Executing host command");
        run_with_timeout(cmd, command, Duration::from_secs(self.config.timeout_secs)).await
    }

    fn dangerous_rule(&self, parsed: &ParsedCommand, args: &str) -> Option<String> {
        let dangerously = &self.config.dangerously;
        if !dangerously.enabled {
            return None;
        }

        match dangerously.commands.get(&parsed.base) {
            Some(patterns) if patterns.is_empty() => Some(format!("{} *", parsed.base)),
            Some(patterns) => {
                find_argument_match(patterns, args).map(|p| format!("{} {}", parsed.base, p))
            }
            None => dangerously
                .commands
                .get(GLOBAL_SCOPE)
                .filter(|bases| bases.iter().any(|b| b == &parsed.base))
                .map(|_| format!("{} *", parsed.base)),
        }
    }

    /// Every non-flag argument (and `--flag=value` value) is checked against
    /// blocked paths, both as given and resolved against the working directory
    fn check_path_arguments(&self, parsed: &ParsedCommand) -> GatewayResult<()> {
        let scope = self
            .config
            .blocked_path_scope
            .as_deref()
            .unwrap_or(GLOBAL_SCOPE);

        for arg in &parsed.args {
            let Some(candidate) = path_argument(arg) else {
                continue;
            };
            let resolved = self.workdir.join(candidate);
            let resolved = resolved.to_string_lossy();

            let blocked = self
                .policy
                .is_path_blocked(scope, candidate)
                .or_else(|| self.policy.is_path_blocked(scope, &resolved));
            if let Some(rule) = blocked {
                return Err(GatewayError::denied_by(
                    format!("access to '{}' is blocked", candidate),
                    rule.to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HostDangerousConfig, SecurityConfig};
    use std::collections::HashMap;

    fn policy() -> Arc<SecurityPolicy> {
        let mut security = SecurityConfig::default();
        security
            .blocked_paths
            .manual
            .insert("*".to_string(), vec![".env".to_string(), "/etc/shadow".to_string()]);
        Arc::new(SecurityPolicy::from_config(&security).unwrap())
    }

    fn executor(config: HostCommandsConfig) -> HostCommandExecutor {
        HostCommandExecutor::new(config, Path::new("/workspace"), policy())
    }

    fn git_config() -> HostCommandsConfig {
        HostCommandsConfig {
            enabled: true,
            whitelist: HashMap::from([
                ("git".to_string(), vec!["status".to_string(), "diff *".to_string()]),
                ("cat".to_string(), vec!["*".to_string()]),
            ]),
            ..HostCommandsConfig::default()
        }
    }

    #[test]
    fn test_whitelist_exact_and_prefix() {
        let executor = executor(git_config());

        let ok = executor.authorize("git status", false).unwrap();
        assert_eq!(ok.authorized_by, AuthorizedBy::Whitelist);
        assert_eq!(ok.rule, "git status");

        let err = executor.authorize("git status --short", false).unwrap_err();
        assert!(err.to_string().contains("not whitelisted"));

        let ok = executor.authorize("git diff HEAD~1", false).unwrap();
        assert_eq!(ok.rule, "git diff *");

        assert!(executor.authorize("git push", false).is_err());
        assert!(executor.authorize("rm -rf build", false).is_err());
    }

    #[test]
    fn test_disabled_executor() {
        let mut config = git_config();
        config.enabled = false;
        assert!(executor(config).authorize("git status", false).is_err());
    }

    #[test]
    fn test_deny_wins_over_whitelist() {
        let config = HostCommandsConfig {
            enabled: true,
            whitelist: HashMap::from([("echo".to_string(), vec!["dangerous test".to_string()])]),
            deny: HashMap::from([("echo".to_string(), vec!["dangerous *".to_string()])]),
            ..HostCommandsConfig::default()
        };
        let err = executor(config).authorize("echo dangerous test", false).unwrap_err();
        assert_eq!(err.rule(), Some("echo dangerous *"));
    }

    #[test]
    fn test_metacharacters_rejected_regardless_of_whitelist() {
        let config = HostCommandsConfig {
            enabled: true,
            whitelist: HashMap::from([("echo".to_string(), vec!["*".to_string()])]),
            ..HostCommandsConfig::default()
        };
        let executor = executor(config);
        for command in [
            "echo hi | cat",
            "echo hi; rm -rf /",
            "echo `whoami`",
            "echo $(id)",
            "echo a && b",
            "echo a || b",
        ] {
            let err = executor.authorize(command, false).unwrap_err();
            assert!(err.is_permission_denied(), "{}", command);
        }
        assert!(executor.authorize("echo hello world", false).is_ok());
    }

    #[test]
    fn test_path_traversal_rejected_in_both_modes() {
        let mut config = git_config();
        config.dangerously = HostDangerousConfig {
            enabled: true,
            commands: HashMap::from([("*".to_string(), vec!["tail".to_string()])]),
        };
        let executor = executor(config);
        assert!(executor.authorize("cat ../secret.txt", false).is_err());
        assert!(executor.authorize("tail -n 5 ../../etc/passwd", true).is_err());
    }

    #[test]
    fn test_dangerous_mode_hint() {
        let mut config = git_config();
        config.dangerously = HostDangerousConfig {
            enabled: true,
            commands: HashMap::from([
                ("*".to_string(), vec!["tail".to_string()]),
                ("npm".to_string(), vec!["run *".to_string()]),
            ]),
        };
        let executor = executor(config);

        let err = executor.authorize("tail -f app.log", false).unwrap_err();
        assert!(matches!(err, GatewayError::RequiresDangerousMode { .. }));
        assert!(err.to_string().contains("dangerously=true"));

        let ok = executor.authorize("tail -f app.log", true).unwrap();
        assert_eq!(ok.authorized_by, AuthorizedBy::DangerousMode);

        assert!(executor.authorize("npm run build", true).is_ok());
        assert!(executor.authorize("npm install", true).is_err());
        // whitelisted commands stay allowed with the flag set
        assert_eq!(
            executor.authorize("git status", true).unwrap().authorized_by,
            AuthorizedBy::Whitelist
        );
    }

    #[test]
    fn test_dangerous_commands_need_enabled_flag() {
        let mut config = git_config();
        config.dangerously = HostDangerousConfig {
            enabled: false,
            commands: HashMap::from([("*".to_string(), vec!["tail".to_string()])]),
        };
        let err = executor(config).authorize("tail app.log", true).unwrap_err();
        assert!(matches!(err, GatewayError::PermissionDenied { .. }));
    }

    #[test]
    fn test_blocked_path_arguments() {
        let executor = executor(git_config());
        let err = executor.authorize("cat .env", false).unwrap_err();
        assert_eq!(err.rule(), Some(".env [manual, scope *]"));
        assert!(executor.authorize("cat /etc/shadow", false).is_err());
        assert!(executor.authorize("cat --file=/etc/shadow", false).is_err());
        assert!(executor.authorize("cat README.md", false).is_ok());
    }

    #[test]
    fn test_unterminated_quote() {
        let executor = executor(git_config());
        let err = executor.authorize("git diff \"HEAD", false).unwrap_err();
        assert!(matches!(err, GatewayError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_execute_non_zero_exit_is_result() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = HostCommandsConfig {
            enabled: true,
            whitelist: HashMap::from([("ls".to_string(), vec!["*".to_string()])]),
            ..HostCommandsConfig::default()
        };
        let executor = HostCommandExecutor::new(config, temp.path(), policy());

        let output = executor.execute("ls does-not-exist", false).await.unwrap();
        assert_ne!(output.exit_code, 0);
    }
}
