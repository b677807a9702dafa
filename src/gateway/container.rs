//! Policy-enforcing facade over a [`ContainerRuntime`]
//!
//! Every operation runs its policy checks before the runtime is touched and
//! passes textual output through the masking rules on the way back out.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use super::runtime::{ContainerRuntime, ContainerSummary, LogOptions};
use crate::error::{GatewayError, GatewayResult};
use crate::policy::pattern::{has_parent_component, normalize_path, path_argument};
use crate::policy::{BlockedPath, Operation, OutputTarget, SecurityPolicy};

/// Default limit for commands run inside containers
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of an authorized container exec
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecResult {
    pub container: String,
    pub command: String,
    pub exit_code: i64,
    /// Combined stdout and stderr, masked
    pub output: String,
    pub dangerously: bool,
}

/// Outcome of a file listing or read. A blocked path is a normal result that
/// names the rule, so the caller can explain why.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileAccess {
    Allowed { path: String, content: String },
    Blocked { path: String, rule: BlockedPath },
}

impl FileAccess {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Allowed { path, .. } | Self::Blocked { path, .. } => path,
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Allowed { content, .. } => Some(content),
            Self::Blocked { .. } => None,
        }
    }
}

/// Container operations mediated by the security policy
#[derive(Clone)]
pub struct ContainerGateway {
    policy: Arc<SecurityPolicy>,
    runtime: Arc<dyn ContainerRuntime>,
    exec_timeout: Duration,
}

impl ContainerGateway {
    /// Create a new gateway
    pub fn new(policy: Arc<SecurityPolicy>, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            policy,
            runtime,
            exec_timeout: DEFAULT_EXEC_TIMEOUT,
        }
    }

    pub fn with_exec_timeout(mut self, exec_timeout: Duration) -> Self {
        self.exec_timeout = exec_timeout;
        self
    }

    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    /// Containers the policy allows access to; others are left out silently
    pub async fn list_containers(&self) -> GatewayResult<Vec<ContainerSummary>> {
        let containers = self.runtime.list_containers().await?;
        let total = containers.len();
        let visible: Vec<_> = containers
            .into_iter()
            .filter(|c| self.policy.can_access_container(&c.name))
            .collect();
        debug!(total, visible = visible.len(), "Listed containers");
        Ok(visible)
    }

    pub async fn get_logs(&self, container: &str, options: &LogOptions) -> GatewayResult<String> {
        self.authorize(container, Operation::Logs)?;
        let logs = self.runtime.logs(container, options).await?;
        Ok(self.policy.mask_output(&logs, OutputTarget::Logs))
    }

    pub async fn get_stats(&self, container: &str) -> GatewayResult<String> {
        self.authorize(container, Operation::Stats)?;
        let stats = self.runtime.stats(container).await?;
        Ok(self.policy.mask_output(&stats, OutputTarget::Inspect))
    }

    pub async fn inspect_container(&self, container: &str) -> GatewayResult<String> {
        self.authorize(container, Operation::Inspect)?;
        let details = self.runtime.inspect(container).await?;
        Ok(self.policy.mask_output(&details, OutputTarget::Inspect))
    }

    /// Run a whitelisted command, or with `dangerously` a dangerous-mode
    /// command whose path arguments are checked against blocked paths.
    /// Relative arguments are also checked against the container's working
    /// directory.
    ///
    /// The command is split on whitespace only; quoting is not interpreted.
    pub async fn exec(
        &self,
        container: &str,
        command: &str,
        dangerously: bool,
    ) -> GatewayResult<ExecResult> {
        self.authorize(container, Operation::Exec)?;

        if dangerously {
            self.policy.can_exec_dangerously(container, command)?;
            self.check_exec_arguments(container, command).await?;
        } else {
            self.policy.can_exec(container, command)?;
        }

        let argv: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        info!(container = %container, command = %command, dangerously, "Executing in container");

        let output = self.runtime.exec(container, &argv, self.exec_timeout).await?;
        Ok(ExecResult {
            container: container.to_string(),
            command: command.to_string(),
            exit_code: output.exit_code,
            output: self.policy.mask_output(&output.output, OutputTarget::Exec),
            dangerously,
        })
    }

    /// `ls -la` on the absolute `path`, bypassing the exec whitelist
    pub async fn list_files(&self, container: &str, path: &str) -> GatewayResult<FileAccess> {
        let path = self.checked_path(container, path)?;
        if let Some(rule) = self.policy.is_path_blocked(container, &path) {
            return Ok(FileAccess::Blocked {
                path,
                rule: rule.clone(),
            });
        }

        let argv = vec!["ls".to_string(), "-la".to_string(), path.clone()];
        let content = self.run_internal(container, &path, argv).await?;
        Ok(FileAccess::Allowed { path, content })
    }

    /// Whole file via `cat`, or the first `max_lines` lines via `head`.
    /// `path` must be absolute.
    pub async fn read_file(
        &self,
        container: &str,
        path: &str,
        max_lines: Option<usize>,
    ) -> GatewayResult<FileAccess> {
        let path = self.checked_path(container, path)?;
        if let Some(rule) = self.policy.is_path_blocked(container, &path) {
            return Ok(FileAccess::Blocked {
                path,
                rule: rule.clone(),
            });
        }

        let argv = match max_lines {
            Some(lines) if lines > 0 => vec![
                "head".to_string(),
                "-n".to_string(),
                lines.to_string(),
                path.clone(),
            ],
            _ => vec!["cat".to_string(), path.clone()],
        };
        let content = self.run_internal(container, &path, argv).await?;
        Ok(FileAccess::Allowed { path, content })
    }

    fn authorize(&self, container: &str, operation: Operation) -> GatewayResult<()> {
        self.policy.check_container_access(container)?;
        self.policy.check_permission(operation).map_err(|e| {
            warn!(container = %container, operation = operation.as_str(), "Operation not permitted");
            e
        })
    }

    /// Container access check plus path validation shared by file operations
    fn checked_path(&self, container: &str, path: &str) -> GatewayResult<String> {
        self.policy.check_container_access(container)?;

        let path = path.trim();
        if path.is_empty() {
            return Err(GatewayError::InvalidInput("path must not be empty".to_string()));
        }
        if path.contains('\0') {
            return Err(GatewayError::InvalidInput("path contains a NUL byte".to_string()));
        }
        if !path.starts_with('/') {
            warn!(container = %container, path = %path, "Rejected relative path");
            return Err(GatewayError::InvalidInput(format!(
                "path '{}' must be absolute",
                path
            )));
        }
        if has_parent_component(path) {
            warn!(container = %container, path = %path, "Rejected path with '..'");
            return Err(GatewayError::InvalidInput(format!(
                "path '{}' must not contain '..'",
                path
            )));
        }
        Ok(normalize_path(path))
    }

    async fn run_internal(
        &self,
        container: &str,
        path: &str,
        argv: Vec<String>,
    ) -> GatewayResult<String> {
        debug!(container = %container, ?argv, "Internal file access");
        let output = self.runtime.exec(container, &argv, self.exec_timeout).await?;
        if output.exit_code != 0 {
            let message = output.output.trim();
            if message.contains("No such file") || message.contains("Not a directory") {
                return Err(GatewayError::not_found("Path", path));
            }
            return Err(GatewayError::execution_failed(
                argv.join(" "),
                format!("exit code {}: {}", output.exit_code, message),
            ));
        }
        Ok(self.policy.mask_output(&output.output, OutputTarget::Exec))
    }

    async fn check_exec_arguments(&self, container: &str, command: &str) -> GatewayResult<()> {
        let mut working_dir: Option<String> = None;

        for arg in command.split_whitespace().skip(1) {
            if arg.contains("..") {
                warn!(container = %container, command = %command, "Dangerous exec rejected: path traversal");
                return Err(GatewayError::denied_by(
                    "path traversal ('..') is not allowed",
                    arg.to_string(),
                ));
            }
            let Some(candidate) = path_argument(arg) else {
                continue;
            };
            self.check_exec_path(container, candidate)?;

            if !candidate.starts_with('/') {
                let dir = match &working_dir {
                    Some(dir) => dir.clone(),
                    None => {
                        let dir = self.working_dir(container).await?;
                        working_dir = Some(dir.clone());
                        dir
                    }
                };
                self.check_exec_path(container, &normalize_path(&format!("{}/{}", dir, candidate)))?;
            }
        }
        Ok(())
    }

    fn check_exec_path(&self, container: &str, path: &str) -> GatewayResult<()> {
        match self.policy.is_path_blocked(container, path) {
            Some(rule) => {
                warn!(container = %container, path = %path, rule = %rule, "Dangerous exec rejected: blocked path");
                Err(GatewayError::denied_by(
                    format!("access to '{}' is blocked", path),
                    rule.to_string(),
                ))
            }
            None => Ok(()),
        }
    }

    /// Working directory of the container; unknown means the exec is refused
    async fn working_dir(&self, container: &str) -> GatewayResult<String> {
        let details = self.runtime.inspect(container).await?;
        parse_working_dir(&details).ok_or_else(|| {
            GatewayError::execution_failed(
                format!("inspect {}", container),
                "could not determine the container working directory",
            )
        })
    }
}

/// `Config.WorkingDir` from inspect output, `/` when unset
fn parse_working_dir(details: &str) -> Option<String> {
    let value: Value = serde_json::from_str(details).ok()?;
    let container = match &value {
        Value::Array(items) => items.first()?,
        other => other,
    };
    let dir = container
        .get("Config")?
        .get("WorkingDir")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Some(if dir.is_empty() { "/".to_string() } else { dir.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DangerousConfig, PermissionsConfig, SecurityConfig};
    use crate::gateway::runtime::ExecOutput;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeRuntime {
        calls: Mutex<Vec<Vec<String>>>,
        exec_output: String,
        exec_exit: i64,
    }

    impl FakeRuntime {
        fn with_output(output: &str, exit: i64) -> Self {
            Self {
                exec_output: output.to_string(),
                exec_exit: exit,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContainerRuntime for FakeRuntime {
        async fn list_containers(&self) -> GatewayResult<Vec<ContainerSummary>> {
            Ok(["app-web", "app-db", "infra-vault"]
                .iter()
                .map(|name| ContainerSummary {
                    id: format!("id-{}", name),
                    name: name.to_string(),
                    image: "busybox".to_string(),
                    state: "running".to_string(),
                    status: "Up".to_string(),
                })
                .collect())
        }

        async fn logs(&self, container: &str, _options: &LogOptions) -> GatewayResult<String> {
            if container == "app-missing" {
                return Err(GatewayError::not_found("Container", container));
            }
            Ok("started\nDB_PASSWORD=hunter2\n".to_string())
        }

        async fn stats(&self, _container: &str) -> GatewayResult<String> {
            Ok(r#"{"CPUPerc":"0.5%"}"#.to_string())
        }

        async fn inspect(&self, _container: &str) -> GatewayResult<String> {
            Ok(r#"[{"Config":{"WorkingDir":"/app","Env":["DB_PASSWORD=hunter2"]}}]"#.to_string())
        }

        async fn exec(
            &self,
            _container: &str,
            argv: &[String],
            _timeout: Duration,
        ) -> GatewayResult<ExecOutput> {
            self.calls.lock().unwrap().push(argv.to_vec());
            Ok(ExecOutput {
                exit_code: self.exec_exit,
                output: self.exec_output.clone(),
            })
        }
    }

    fn security() -> SecurityConfig {
        let mut config = SecurityConfig {
            allowed_containers: vec!["app-*".to_string()],
            exec_whitelist: HashMap::from([(
                "app-web".to_string(),
                vec!["npm test".to_string(), "ls -la".to_string()],
            )]),
            dangerously: DangerousConfig {
                enabled: true,
                commands: HashMap::from([("app-web".to_string(), vec!["cat".to_string()])]),
            },
            ..SecurityConfig::default()
        };
        config
            .blocked_paths
            .manual
            .insert("app-web".to_string(), vec!["/app/secrets".to_string(), ".env".to_string()]);
        config
    }

    fn gateway(config: SecurityConfig, runtime: Arc<FakeRuntime>) -> ContainerGateway {
        let policy = Arc::new(SecurityPolicy::from_config(&config).unwrap());
        ContainerGateway::new(policy, runtime)
    }

    #[tokio::test]
    async fn test_list_containers_filters_by_policy() {
        let gw = gateway(security(), Arc::new(FakeRuntime::default()));
        let names: Vec<_> = gw
            .list_containers()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["app-web", "app-db"]);
    }

    #[tokio::test]
    async fn test_container_access_denied() {
        let gw = gateway(security(), Arc::new(FakeRuntime::default()));
        let err = gw.get_logs("infra-vault", &LogOptions::default()).await.unwrap_err();
        assert!(err.is_permission_denied());
    }

    #[tokio::test]
    async fn test_permission_flag_disabled() {
        let mut config = security();
        config.permissions = PermissionsConfig {
            inspect: false,
            ..PermissionsConfig::default()
        };
        let gw = gateway(config, Arc::new(FakeRuntime::default()));
        assert!(gw.inspect_container("app-web").await.unwrap_err().is_permission_denied());
        assert!(gw.get_stats("app-web").await.is_ok());
    }

    #[tokio::test]
    async fn test_runtime_errors_are_not_denials() {
        let gw = gateway(security(), Arc::new(FakeRuntime::default()));
        let err = gw.get_logs("app-missing", &LogOptions::default()).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { .. }));
        assert!(!err.is_permission_denied());
    }

    #[tokio::test]
    async fn test_output_is_masked() {
        let gw = gateway(security(), Arc::new(FakeRuntime::default()));
        let logs = gw.get_logs("app-web", &LogOptions::default()).await.unwrap();
        assert!(logs.contains("started"));
        assert!(!logs.contains("hunter2"));

        let details = gw.inspect_container("app-web").await.unwrap();
        assert!(!details.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_exec_whitelisted_splits_on_whitespace() {
        let runtime = Arc::new(FakeRuntime::with_output("ok\n", 0));
        let gw = gateway(security(), runtime.clone());

        let result = gw.exec("app-web", "npm test", false).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.output, "ok\n");
        assert_eq!(runtime.calls(), vec![vec!["npm".to_string(), "test".to_string()]]);
    }

    #[tokio::test]
    async fn test_exec_not_whitelisted() {
        let runtime = Arc::new(FakeRuntime::default());
        let gw = gateway(security(), runtime.clone());

        let err = gw.exec("app-web", "npm test ", false).await.unwrap_err();
        assert!(err.is_permission_denied());

        let err = gw.exec("app-web", "cat /app/README.md", false).await.unwrap_err();
        assert!(matches!(err, GatewayError::RequiresDangerousMode { .. }));
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dangerous_exec_checks_paths() {
        let runtime = Arc::new(FakeRuntime::with_output("content", 0));
        let gw = gateway(security(), runtime.clone());

        assert!(gw.exec("app-web", "cat /app/README.md", true).await.is_ok());

        let err = gw.exec("app-web", "cat /app/secrets/key.pem", true).await.unwrap_err();
        assert!(err.rule().is_some_and(|rule| rule.contains("/app/secrets")));

        let err = gw.exec("app-web", "cat /app/../etc/shadow", true).await.unwrap_err();
        assert!(err.is_permission_denied());

        assert!(gw.exec("app-web", "rm -rf /", true).await.unwrap_err().is_permission_denied());
        assert_eq!(runtime.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_read_file_blocked_returns_rule() {
        let runtime = Arc::new(FakeRuntime::default());
        let gw = gateway(security(), runtime.clone());

        let access = gw.read_file("app-web", "/app//config/.env", None).await.unwrap();
        assert!(access.is_blocked());
        assert_eq!(access.path(), "/app/config/.env");
        match access {
            FileAccess::Blocked { rule, .. } => assert_eq!(rule.pattern, ".env"),
            FileAccess::Allowed { .. } => panic!("expected blocked"),
        }
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_read_file_with_max_lines() {
        let runtime = Arc::new(FakeRuntime::with_output("line1\napi_key = abc123\n", 0));
        let gw = gateway(security(), runtime.clone());

        let access = gw.read_file("app-web", "/app/main.py", Some(2)).await.unwrap();
        assert!(!access.is_blocked());
        assert!(access.content().unwrap().contains("line1"));
        assert!(!access.content().unwrap().contains("abc123"));
        assert_eq!(runtime.calls()[0], vec!["head", "-n", "2", "/app/main.py"]);

        gw.read_file("app-web", "/app/main.py", None).await.unwrap();
        assert_eq!(runtime.calls()[1], vec!["cat", "/app/main.py"]);
    }

    #[tokio::test]
    async fn test_list_files() {
        let runtime = Arc::new(FakeRuntime::with_output("total 0\n", 0));
        let gw = gateway(security(), runtime.clone());

        assert!(gw.list_files("app-web", "/app/secrets").await.unwrap().is_blocked());
        let access = gw.list_files("app-web", "/app").await.unwrap();
        assert_eq!(access.content(), Some("total 0\n"));
        assert_eq!(runtime.calls(), vec![vec!["ls", "-la", "/app"]]);
    }

    #[tokio::test]
    async fn test_file_access_requires_absolute_path() {
        let runtime = Arc::new(FakeRuntime::default());
        let gw = gateway(security(), runtime.clone());

        for path in ["secrets/key.pem", "./secrets", "README.md"] {
            let err = gw.read_file("app-web", path, None).await.unwrap_err();
            assert!(matches!(err, GatewayError::InvalidInput(_)), "{}", path);
            let err = gw.list_files("app-web", path).await.unwrap_err();
            assert!(matches!(err, GatewayError::InvalidInput(_)), "{}", path);
        }
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dangerous_exec_resolves_relative_paths() {
        let runtime = Arc::new(FakeRuntime::with_output("content", 0));
        let gw = gateway(security(), runtime.clone());

        // working directory is /app
        let err = gw.exec("app-web", "cat secrets/key.pem", true).await.unwrap_err();
        assert!(err.rule().is_some_and(|rule| rule.contains("/app/secrets")));
        assert!(gw.exec("app-web", "cat ./secrets", true).await.is_err());

        assert!(gw.exec("app-web", "cat README.md", true).await.is_ok());
        assert_eq!(runtime.calls(), vec![vec!["cat", "README.md"]]);
    }

    #[test]
    fn test_parse_working_dir() {
        assert_eq!(
            parse_working_dir(r#"[{"Config":{"WorkingDir":"/srv"}}]"#).as_deref(),
            Some("/srv")
        );
        assert_eq!(parse_working_dir(r#"{"Config":{"WorkingDir":""}}"#).as_deref(), Some("/"));
        assert_eq!(parse_working_dir(r#"{"Config":{}}"#).as_deref(), Some("/"));
        assert_eq!(parse_working_dir("[]"), None);
        assert_eq!(parse_working_dir("not json"), None);
    }

    #[tokio::test]
    async fn test_file_access_rejects_traversal() {
        let gw = gateway(security(), Arc::new(FakeRuntime::default()));
        let err = gw.read_file("app-web", "/app/../etc/passwd", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let runtime = Arc::new(FakeRuntime::with_output(
            "cat: /app/nope: No such file or directory\n",
            1,
        ));
        let gw = gateway(security(), runtime);
        let err = gw.read_file("app-web", "/app/nope", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { kind: "Path", .. }));
    }
}
