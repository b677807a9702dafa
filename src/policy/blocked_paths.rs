//! Blocked path index merging manual and auto-imported entries

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::policy::pattern::PathPattern;

/// Scope key for entries that apply to every container
pub const GLOBAL_SCOPE: &str = "*";

/// Where a blocked path entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSource {
    Manual,
    AutoImported,
}

/// A path pattern denied regardless of otherwise successful authorization
#[derive(Debug, Clone, Serialize)]
pub struct BlockedPath {
    pub pattern: String,
    /// Container name, or `*` for every container
    pub scope: String,
    pub source: PathSource,
    /// File the entry was imported from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(skip)]
    compiled: PathPattern,
}

impl BlockedPath {
    pub fn new(scope: impl Into<String>, pattern: &str, source: PathSource) -> Self {
        Self {
            pattern: pattern.to_string(),
            scope: scope.into(),
            source,
            origin: None,
            compiled: PathPattern::new(pattern),
        }
    }

    /// Record the file an imported entry came from
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn is_global(&self) -> bool {
        self.scope == GLOBAL_SCOPE
    }

    pub fn matches(&self, path: &str) -> bool {
        self.compiled.matches(path)
    }
}

impl fmt::Display for BlockedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source {
            PathSource::Manual => "manual",
            PathSource::AutoImported => "auto-imported",
        };
        write!(f, "{} [{}, scope {}", self.pattern, source, self.scope)?;
        if let Some(origin) = &self.origin {
            write!(f, ", from {}", origin)?;
        }
        write!(f, "]")
    }
}

/// Index of blocked paths keyed by container scope
#[derive(Debug, Clone, Default)]
pub struct BlockedPathIndex {
    scoped: HashMap<String, Vec<BlockedPath>>,
    global: Vec<BlockedPath>,
}

impl BlockedPathIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from the manual `container -> [pattern]` table
    pub fn from_manual(manual: &HashMap<String, Vec<String>>) -> Self {
        let mut index = Self::new();
        for (scope, patterns) in manual {
            for pattern in patterns {
                index.insert(BlockedPath::new(scope.clone(), pattern, PathSource::Manual));
            }
        }
        index
    }

    pub fn insert(&mut self, entry: BlockedPath) {
        if entry.is_global() {
            self.global.push(entry);
        } else {
            self.scoped.entry(entry.scope.clone()).or_default().push(entry);
        }
    }

    /// Merge imported entries; duplicates are harmless since matching is idempotent
    pub fn extend(&mut self, entries: impl IntoIterator<Item = BlockedPath>) {
        for entry in entries {
            self.insert(entry);
        }
    }

    /// Find the rule blocking `path` for `container`.
    /// Container-specific entries are consulted before global ones.
    pub fn find(&self, container: &str, path: &str) -> Option<&BlockedPath> {
        self.scoped
            .get(container)
            .into_iter()
            .flatten()
            .chain(self.global.iter())
            .find(|entry| entry.matches(path))
    }

    pub fn len(&self) -> usize {
        self.global.len() + self.scoped.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> BlockedPathIndex {
        BlockedPathIndex::from_manual(&HashMap::from([
            ("*".to_string(), vec!["/etc/shadow".to_string(), "*.pem".to_string()]),
            ("api".to_string(), vec!["/app/config".to_string()]),
        ]))
    }

    #[test]
    fn test_scoped_and_global_lookup() {
        let index = index();
        assert_eq!(index.len(), 3);

        let rule = index.find("api", "/app/config/prod.json").unwrap();
        assert_eq!(rule.pattern, "/app/config");
        assert_eq!(rule.scope, "api");

        assert!(index.find("web", "/app/config/prod.json").is_none());
        assert_eq!(index.find("web", "/etc/shadow").unwrap().scope, "*");
        assert_eq!(index.find("api", "/certs/server.pem").unwrap().pattern, "*.pem");
        assert!(index.find("api", "/app/src/main.rs").is_none());
    }

    #[test]
    fn test_container_specific_wins() {
        let mut index = BlockedPathIndex::new();
        index.insert(BlockedPath::new("*", "/data", PathSource::Manual));
        index.insert(
            BlockedPath::new("db", "/data/pg", PathSource::AutoImported)
                .with_origin("docker-compose.yml"),
        );

        let rule = index.find("db", "/data/pg/base").unwrap();
        assert_eq!(rule.source, PathSource::AutoImported);
        assert_eq!(
            rule.to_string(),
            "/data/pg [auto-imported, scope db, from docker-compose.yml]"
        );
    }

    #[test]
    fn test_duplicates_are_harmless() {
        let mut index = index();
        index.extend(vec![BlockedPath::new("*", "/etc/shadow", PathSource::AutoImported)]);
        assert_eq!(index.len(), 4);
        assert_eq!(index.find("x", "/etc/shadow").unwrap().source, PathSource::Manual);
    }
}
