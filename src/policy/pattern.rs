//! Glob and prefix matching primitives shared by every policy check

use glob::{MatchOptions, Pattern};
use tracing::warn;

use crate::error::{GatewayError, GatewayResult};

const PATH_MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Compiled set of glob patterns for container names
#[derive(Debug, Clone, Default)]
pub struct NamePatterns {
    patterns: Vec<Pattern>,
}

impl NamePatterns {
    /// Compile a list of glob patterns; an invalid pattern is a configuration error
    pub fn compile(patterns: &[String]) -> GatewayResult<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    GatewayError::invalid_config(format!("Invalid container pattern '{}': {}", p, e))
                })
            })
            .collect::<GatewayResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// First pattern matching `name`
    pub fn find(&self, name: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| p.matches(name))
            .map(Pattern::as_str)
    }

    pub fn matches(&self, name: &str) -> bool {
        self.find(name).is_some()
    }
}

/// Argument pattern of a host command rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentPattern {
    /// Argument string must be identical
    Exact(String),
    /// Argument string must start with the text before the trailing `*`
    Prefix(String),
}

impl ArgumentPattern {
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => Self::Prefix(prefix.to_string()),
            None => Self::Exact(pattern.to_string()),
        }
    }

    pub fn matches(&self, args: &str) -> bool {
        match self {
            Self::Exact(exact) => exact == args,
            Self::Prefix(prefix) => args.starts_with(prefix.as_str()),
        }
    }
}

/// True if any pattern in `patterns` matches `args`; returns the matching pattern
pub fn find_argument_match<'a>(patterns: &'a [String], args: &str) -> Option<&'a str> {
    patterns
        .iter()
        .find(|p| ArgumentPattern::parse(p).matches(args))
        .map(String::as_str)
}

/// A path pattern compiled once at policy construction
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    normalized: String,
    glob: Option<Pattern>,
}

impl PathPattern {
    pub fn new(raw: &str) -> Self {
        let normalized = normalize_path(raw);
        let glob = if has_glob_meta(&normalized) {
            match Pattern::new(&normalized) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(pattern = %raw, error = %e, "Invalid glob in blocked path, matching literally");
                    None
                }
            }
        } else {
            None
        };

        Self {
            raw: raw.to_string(),
            normalized,
            glob,
        }
    }

    /// Pattern as it was configured
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether `path`, or any directory containing it, is covered by the pattern.
    ///
    /// Absolute patterns are matched against the whole path; relative patterns
    /// against every trailing run of path components, so `.env` covers
    /// `/app/.env` and `*.key` covers `/etc/ssl/site.key`.
    pub fn matches(&self, path: &str) -> bool {
        if self.normalized.is_empty() {
            return false;
        }
        let path = normalize_path(path);
        let absolute = self.normalized.starts_with('/');

        let matched = ancestors(&path).any(|candidate| {
            if absolute {
                self.matches_text(candidate)
            } else {
                component_suffixes(candidate).any(|suffix| self.matches_text(suffix))
            }
        });
        matched
    }

    fn matches_text(&self, text: &str) -> bool {
        match &self.glob {
            Some(glob) => glob.matches_with(text, PATH_MATCH_OPTIONS),
            None => self.normalized == text,
        }
    }
}

/// Collapse duplicate separators and `.` components, drop trailing `/`.
/// `..` components are kept; callers reject them.
pub fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let parts: Vec<&str> = path
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// The part of a command argument that may name a path: the argument itself,
/// or the value of a `--flag=value` option. Bare flags yield `None`.
pub fn path_argument(arg: &str) -> Option<&str> {
    match arg.strip_prefix('-') {
        Some(flag) => flag
            .split_once('=')
            .map(|(_, value)| value)
            .filter(|value| !value.is_empty()),
        None => Some(arg),
    }
}

/// True if any `/`-separated component is `..`
pub fn has_parent_component(path: &str) -> bool {
    path.split('/').any(|part| part == "..")
}

fn has_glob_meta(text: &str) -> bool {
    text.contains(['*', '?', '['])
}

/// The path itself followed by each parent directory, excluding `/`
fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    let mut current = Some(path);
    std::iter::from_fn(move || {
        let item = current?;
        current = item
            .rfind('/')
            .map(|idx| &item[..idx])
            .filter(|parent| !parent.is_empty());
        Some(item)
    })
    .filter(|p| !p.is_empty() && *p != "/")
}

/// `a/b/c` yields `a/b/c`, `b/c`, `c`
fn component_suffixes(path: &str) -> impl Iterator<Item = &str> {
    let trimmed = path.trim_start_matches('/');
    std::iter::once(trimmed).chain(
        trimmed
            .match_indices('/')
            .map(move |(idx, _)| &trimmed[idx + 1..]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_patterns() {
        let patterns = NamePatterns::compile(&["app-*".to_string(), "db".to_string()]).unwrap();
        assert!(patterns.matches("app-web"));
        assert!(patterns.matches("db"));
        assert!(!patterns.matches("db-replica"));
        assert!(!patterns.matches("web-app"));
        assert_eq!(patterns.find("app-api"), Some("app-*"));
    }

    #[test]
    fn test_invalid_name_pattern() {
        assert!(NamePatterns::compile(&["app-[".to_string()]).is_err());
    }

    #[test]
    fn test_argument_patterns() {
        assert!(ArgumentPattern::parse("status").matches("status"));
        assert!(!ArgumentPattern::parse("status").matches("status --short"));
        assert!(ArgumentPattern::parse("diff *").matches("diff HEAD~1"));
        assert!(!ArgumentPattern::parse("diff *").matches("log"));
        assert!(ArgumentPattern::parse("*").matches(""));
        assert_eq!(
            find_argument_match(&["status".to_string(), "diff *".to_string()], "diff a b"),
            Some("diff *")
        );
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/app//src/./main.rs"), "/app/src/main.rs");
        assert_eq!(normalize_path("./secrets/"), "secrets");
        assert_eq!(normalize_path("/"), "/");
        assert!(has_parent_component("/app/../etc/passwd"));
        assert!(!has_parent_component("/app/..hidden"));
    }

    #[test]
    fn test_path_argument() {
        assert_eq!(path_argument("/etc/hosts"), Some("/etc/hosts"));
        assert_eq!(path_argument("--config=/app/.env"), Some("/app/.env"));
        assert_eq!(path_argument("-n"), None);
        assert_eq!(path_argument("--file="), None);
    }

    #[test]
    fn test_absolute_path_pattern() {
        let pattern = PathPattern::new("/workspace/secrets");
        assert!(pattern.matches("/workspace/secrets"));
        assert!(pattern.matches("/workspace/secrets/db.json"));
        assert!(pattern.matches("/workspace//secrets/./db.json"));
        assert!(!pattern.matches("/workspace/secrets-public"));
        assert!(!pattern.matches("/other/workspace/secrets"));
    }

    #[test]
    fn test_relative_path_pattern() {
        let env = PathPattern::new(".env");
        assert!(env.matches("/app/.env"));
        assert!(env.matches(".env"));
        assert!(!env.matches("/app/.env.example"));

        let keys = PathPattern::new("*.key");
        assert!(keys.matches("/etc/ssl/private/site.key"));
        assert!(!keys.matches("/etc/ssl/private/site.crt"));

        let nested = PathPattern::new("config/secrets/*");
        assert!(nested.matches("/srv/app/config/secrets/prod.yml"));
        assert!(!nested.matches("/srv/app/secrets/prod.yml"));
    }

    #[test]
    fn test_glob_directory_pattern() {
        let pattern = PathPattern::new("/run/secrets/*");
        assert!(pattern.matches("/run/secrets/token"));
        assert!(pattern.matches("/run/secrets/nested/token"));
        assert!(!pattern.matches("/run/secrets"));
    }
}
