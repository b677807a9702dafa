//! Tool script header parsing
//!
//! A tool documents itself in its leading comment block:
//!
//! ```text
//! #!/usr/bin/env bash
//! # Rebuild the frontend bundle and report its size.
//! #
//! # Usage: build-frontend.sh [--release]
//! # Examples:
//! #   build-frontend.sh
//! #   build-frontend.sh --release
//! # ---
//! ```
//!
//! Parsing stops at a separator line (`---` or `===`), at the first line of
//! code, or after [`HEADER_LINE_LIMIT`] lines, whichever comes first.

use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{GatewayError, GatewayResult};

/// Lines read from the top of a script when looking for its header
pub const HEADER_LINE_LIMIT: usize = 50;

/// Script flavours with their own comment syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    Shell,
    Python,
    Go,
}

impl ScriptKind {
    /// Kind for a file extension without the dot
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "sh" | "bash" => Some(Self::Shell),
            "py" => Some(Self::Python),
            "go" => Some(Self::Go),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Program and leading arguments used to run a script of this kind
    pub fn interpreter(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Self::Shell => ("bash", &[]),
            Self::Python => ("python3", &[]),
            Self::Go => ("go", &["run"]),
        }
    }

    fn strip_comment<'a>(&self, line: &'a str) -> Option<&'a str> {
        let prefix = match self {
            Self::Shell | Self::Python => "#",
            Self::Go => "//",
        };
        line.strip_prefix(prefix).map(str::trim)
    }

    /// Comment lines that carry tooling directives rather than documentation
    fn is_directive(&self, text: &str) -> bool {
        match self {
            Self::Shell => text.starts_with("shellcheck "),
            Self::Python => text.contains("-*-"),
            Self::Go => text.starts_with("go:") || text.starts_with("+build"),
        }
    }
}

/// Documentation extracted from a tool's header
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolHeader {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

/// Read and parse the header of the script at `path`
pub fn read_header(path: &Path) -> GatewayResult<ToolHeader> {
    let kind = ScriptKind::from_path(path).ok_or_else(|| {
        GatewayError::ParseError(format!("{}: unsupported script type", path.display()))
    })?;

    let reader = BufReader::new(File::open(path)?);
    let lines = reader
        .lines()
        .take(HEADER_LINE_LIMIT)
        .collect::<Result<Vec<_>, _>>()?;

    parse_header(kind, &lines)
        .map_err(|e| GatewayError::ParseError(format!("{}: {}", path.display(), e)))
}

/// Parse a header from the leading lines of a script
pub fn parse_header(kind: ScriptKind, lines: &[String]) -> GatewayResult<ToolHeader> {
    let comments = comment_block(kind, &lines[..lines.len().min(HEADER_LINE_LIMIT)]);

    let mut section = Section::Description;
    let mut description = Vec::new();
    let mut usage = Vec::new();
    let mut examples = Vec::new();

    for line in &comments {
        if let Some(rest) = strip_label(line, "usage:") {
            section = Section::Usage;
            if !rest.is_empty() {
                usage.push(rest.to_string());
            }
            continue;
        }
        if let Some(rest) = strip_label(line, "examples:").or_else(|| strip_label(line, "example:")) {
            section = Section::Examples;
            if !rest.is_empty() {
                examples.push(rest.to_string());
            }
            continue;
        }
        if line.is_empty() {
            continue;
        }
        match section {
            Section::Description => description.push(line.as_str()),
            Section::Usage => usage.push(line.clone()),
            Section::Examples => examples.push(line.trim_start_matches("$ ").to_string()),
        }
    }

    if description.is_empty() {
        return Err(GatewayError::ParseError(
            "missing description in tool header".to_string(),
        ));
    }

    Ok(ToolHeader {
        description: description.join(" "),
        usage: (!usage.is_empty()).then(|| usage.join("\n")),
        examples,
    })
}

enum Section {
    Description,
    Usage,
    Examples,
}

/// Text of the leading comment block, one entry per line
fn comment_block(kind: ScriptKind, lines: &[String]) -> Vec<String> {
    let mut comments = Vec::new();
    let mut docstring: Option<&'static str> = None;

    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if idx == 0 && trimmed.starts_with("#!") {
            continue;
        }

        if let Some(delimiter) = docstring {
            match trimmed.find(delimiter) {
                Some(end) => {
                    let text = trimmed[..end].trim();
                    if !is_separator(text) && !text.is_empty() {
                        comments.push(text.to_string());
                    }
                    break;
                }
                None if is_separator(trimmed) => break,
                None => {
                    comments.push(trimmed.to_string());
                    continue;
                }
            }
        }

        if trimmed.is_empty() {
            if comments.is_empty() {
                continue;
            }
            break;
        }

        if let Some(text) = kind.strip_comment(trimmed) {
            if kind.is_directive(text) {
                continue;
            }
            if is_separator(text) {
                break;
            }
            comments.push(text.to_string());
            continue;
        }

        if kind == ScriptKind::Python && comments.is_empty() {
            if let Some((delimiter, rest)) = open_docstring(trimmed) {
                match rest.find(delimiter) {
                    Some(end) => {
                        comments.push(rest[..end].trim().to_string());
                        break;
                    }
                    None => {
                        let rest = rest.trim();
                        if !rest.is_empty() {
                            comments.push(rest.to_string());
                        }
                        docstring = Some(delimiter);
                        continue;
                    }
                }
            }
        }

        // first line of code, including Go's `package`
        break;
    }

    comments
}

fn open_docstring(line: &str) -> Option<(&'static str, &str)> {
    ["\"\"\"", "'''"]
        .into_iter()
        .find_map(|delimiter| line.strip_prefix(delimiter).map(|rest| (delimiter, rest)))
}

fn is_separator(text: &str) -> bool {
    text.len() >= 3 && (text.chars().all(|c| c == '-') || text.chars().all(|c| c == '='))
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    line.get(..label.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(label))
        .map(|_| line[label.len()..].trim())
}
