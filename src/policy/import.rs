//! Construction-time import of blocked paths from workspace files
//!
//! Three sources are scanned:
//! - AI-tool ignore files (`.aiignore`, `.claudeignore`, `.cursorignore`)
//! - assistant settings files, whose `permissions.deny` holds `Read(<pattern>)` entries
//! - compose files, where a volume sourced from `/dev/null` hides a file and a
//!   `tmpfs` mount hides a directory
//!
//! Every failure is logged and skipped; the caller keeps its manual entries.

use serde_yaml::Value as YamlValue;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::AutoImportConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::policy::blocked_paths::{BlockedPath, PathSource, GLOBAL_SCOPE};

const AI_IGNORE_FILES: &[&str] = &[".aiignore", ".claudeignore", ".cursorignore"];

const SETTINGS_FILES: &[&str] = &[".claude/settings.json", ".claude/settings.local.json"];

const COMPOSE_FILE_NAMES: &[&str] = &[
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

const SKIPPED_DIRS: &[&str] = &["node_modules", "target", "vendor"];

/// Scan the configured sources and return every blocked path found
pub fn import_blocked_paths(config: &AutoImportConfig) -> Vec<BlockedPath> {
    if !config.enabled {
        return Vec::new();
    }

    let mut imported = Vec::new();

    if let Some(root) = &config.workspace_root {
        if config.scan_ai_ignore_files {
            for name in AI_IGNORE_FILES {
                collect(&mut imported, parse_ignore_file(&root.join(name)));
            }
            for name in SETTINGS_FILES {
                collect(&mut imported, parse_settings_file(&root.join(name)));
            }
        }

        for compose in find_compose_files(root, config.max_depth) {
            collect(&mut imported, parse_compose_file(&compose));
        }
    }

    for compose in &config.compose_files {
        collect(&mut imported, parse_compose_file(compose));
    }

    info!(count = imported.len(), "Auto-imported blocked paths");
    imported
}

fn collect(into: &mut Vec<BlockedPath>, result: GatewayResult<Vec<BlockedPath>>) {
    match result {
        Ok(entries) => into.extend(entries),
        Err(e) => warn!(error = %e, "Skipping blocked path import source"),
    }
}

/// Lines of an ignore file become global patterns; negations cannot unblock
pub fn parse_ignore_file(path: &Path) -> GatewayResult<Vec<BlockedPath>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    let origin = path.display().to_string();

    let entries: Vec<BlockedPath> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .map(|line| {
            let pattern = line.trim_start_matches('/');
            BlockedPath::new(GLOBAL_SCOPE, pattern, PathSource::AutoImported).with_origin(&origin)
        })
        .collect();

    debug!(file = %origin, count = entries.len(), "Parsed ignore file");
    Ok(entries)
}

/// `permissions.deny` entries of the form `Read(<pattern>)`
pub fn parse_settings_file(path: &Path) -> GatewayResult<Vec<BlockedPath>> {
    if !path.is_file() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    let settings: serde_json::Value = serde_json::from_str(&content)?;
    let origin = path.display().to_string();

    let entries = settings
        .pointer("/permissions/deny")
        .and_then(|v| v.as_array())
        .map(|deny| {
            deny.iter()
                .filter_map(|rule| rule.as_str())
                .filter_map(|rule| rule.strip_prefix("Read(")?.strip_suffix(')'))
                .map(|pattern| pattern.trim_start_matches("./"))
                .filter(|pattern| !pattern.is_empty())
                .map(|pattern| {
                    BlockedPath::new(GLOBAL_SCOPE, pattern, PathSource::AutoImported)
                        .with_origin(&origin)
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    debug!(file = %origin, count = entries.len(), "Parsed settings file");
    Ok(entries)
}

/// Compose files at most `max_depth` directories below `root`
pub fn find_compose_files(root: &Path, max_depth: usize) -> Vec<PathBuf> {
    let mut found = Vec::new();
    walk(root, 0, max_depth, &mut found);
    found.sort();
    found
}

fn walk(dir: &Path, depth: usize, max_depth: usize, found: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Cannot scan directory for compose files");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            if depth < max_depth && !name.starts_with('.') && !SKIPPED_DIRS.contains(&name.as_str()) {
                walk(&path, depth + 1, max_depth, found);
            }
        } else if COMPOSE_FILE_NAMES.contains(&name.as_str()) {
            found.push(path);
        }
    }
}

/// Hidden files (`/dev/null` sources) and hidden directories (`tmpfs`) per service
pub fn parse_compose_file(path: &Path) -> GatewayResult<Vec<BlockedPath>> {
    let content = fs::read_to_string(path)?;
    let document: YamlValue = serde_yaml::from_str(&content).map_err(|e| {
        GatewayError::ParseError(format!("{}: {}", path.display(), e))
    })?;
    let origin = path.display().to_string();

    let Some(services) = document.get("services").and_then(YamlValue::as_mapping) else {
        return Ok(Vec::new());
    };

    let mut entries = Vec::new();
    for (_, service) in services.iter() {
        let scope = service
            .get("container_name")
            .and_then(YamlValue::as_str)
            .unwrap_or(GLOBAL_SCOPE)
            .to_string();

        let mut hidden = Vec::new();
        if let Some(volumes) = service.get("volumes").and_then(YamlValue::as_sequence) {
            hidden.extend(volumes.iter().filter_map(hidden_volume_target));
        }
        match service.get("tmpfs") {
            Some(YamlValue::String(single)) => hidden.push(tmpfs_target(single)),
            Some(YamlValue::Sequence(list)) => hidden.extend(
                list.iter()
                    .filter_map(YamlValue::as_str)
                    .map(tmpfs_target),
            ),
            _ => {}
        }

        entries.extend(hidden.into_iter().map(|target| {
            BlockedPath::new(scope.clone(), &target, PathSource::AutoImported).with_origin(&origin)
        }));
    }

    debug!(file = %origin, count = entries.len(), "Parsed compose file");
    Ok(entries)
}

fn hidden_volume_target(volume: &YamlValue) -> Option<String> {
    match volume {
        YamlValue::String(short) => {
            let mut parts = short.split(':');
            let source = parts.next()?;
            let target = parts.next()?;
            (source == "/dev/null").then(|| target.to_string())
        }
        YamlValue::Mapping(_) => {
            let target = volume.get("target").and_then(YamlValue::as_str)?;
            let kind = volume.get("type").and_then(YamlValue::as_str);
            let source = volume.get("source").and_then(YamlValue::as_str);
            (kind == Some("tmpfs") || source == Some("/dev/null")).then(|| target.to_string())
        }
        _ => None,
    }
}

fn tmpfs_target(entry: &str) -> String {
    entry.split(':').next().unwrap_or(entry).to_string()
}
