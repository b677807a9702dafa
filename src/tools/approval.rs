//! Approval pipeline promoting staging scripts into the approved store
//!
//! Staging scripts live in the workspace, where the sandboxed assistant can
//! write them. Nothing runs from there in secure mode until an operator has
//! reviewed each new or changed file and it has been copied into the
//! per-project (or `_common`) approved directory.

use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File, Permissions};
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::HostToolsConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::tools::name::validate_name;
use crate::platform_dirs::ensure_dir;
use crate::tools::project::{
    absolute_workspace, content_digest, file_digest, project_id, COMMON_DIR, PROJECT_MARKER,
};
use crate::tools::registry::approved_root;

/// Lines of the staging script shown to the operator
pub const PREVIEW_LINES: usize = 20;

/// How a staging script relates to its approved copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// No approved copy yet
    New,
    /// Approved copy differs
    Updated,
    Unchanged,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncItem {
    pub name: String,
    pub status: SyncStatus,
    pub staging_path: PathBuf,
    pub approved_path: PathBuf,
}

/// Compare by size first and only hash equal-size files
pub fn compare_files(staging: &Path, approved: &Path) -> io::Result<SyncStatus> {
    let staging_len = fs::metadata(staging)?.len();
    let approved_len = match fs::metadata(approved) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SyncStatus::New),
        Err(e) => return Err(e),
    };

    if staging_len != approved_len {
        return Ok(SyncStatus::Updated);
    }
    if file_digest(staging)? == file_digest(approved)? {
        Ok(SyncStatus::Unchanged)
    } else {
        Ok(SyncStatus::Updated)
    }
}

/// Where approved scripts are installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApprovalTarget {
    /// `<approved root>/<project id>`
    #[default]
    Project,
    /// `<approved root>/_common`, visible to every project
    Common,
}

/// Operator decision for one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approve,
    Skip,
    /// Stop reviewing; remaining items are left untouched
    Quit,
}

/// Everything the operator sees before deciding on an item.
///
/// The staging file is read once; an approval installs exactly these bytes,
/// whatever the staging file holds by the time the operator answers.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalRequest {
    pub item: SyncItem,
    pub staging_size: u64,
    pub staging_digest: String,
    pub approved_size: Option<u64>,
    pub approved_digest: Option<String>,
    /// Leading lines of the staging script
    pub preview: Vec<String>,
    /// True when the script is longer than the preview
    pub truncated: bool,
    #[serde(skip)]
    content: Vec<u8>,
    #[serde(skip)]
    permissions: Permissions,
}

impl ApprovalRequest {
    fn for_item(item: &SyncItem) -> io::Result<Self> {
        let mut file = File::open(&item.staging_path)?;
        let permissions = file.metadata()?.permissions();
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;

        let staging_size = content.len() as u64;
        let staging_digest = content_digest(&content);
        let (approved_size, approved_digest) = match item.status {
            SyncStatus::New => (None, None),
            _ => (
                Some(fs::metadata(&item.approved_path)?.len()),
                Some(file_digest(&item.approved_path)?),
            ),
        };

        let lines = display_lines(&content);
        let truncated = lines.len() > PREVIEW_LINES;
        let preview = lines.into_iter().take(PREVIEW_LINES).collect();

        Ok(Self {
            item: item.clone(),
            staging_size,
            staging_digest,
            approved_size,
            approved_digest,
            preview,
            truncated,
            content,
            permissions,
        })
    }

    /// Every line of the script as it will be installed
    pub fn full_text(&self) -> Vec<String> {
        display_lines(&self.content)
    }
}

fn display_lines(content: &[u8]) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }
    let body = content.strip_suffix(b"\n").unwrap_or(content);
    body.split(|&byte| byte == b'\n')
        .map(|line| match std::str::from_utf8(line) {
            Ok(text) => text.trim_end_matches('\r').to_string(),
            Err(_) => "<binary content>".to_string(),
        })
        .collect()
}

/// Request/response seam between the pipeline and whoever approves
pub trait ApprovalPrompt {
    fn decide(&mut self, request: &ApprovalRequest) -> GatewayResult<ApprovalDecision>;
}

/// Line-oriented prompt: prints the request, reads `y`, `n`, `v` or `q`.
/// `v` prints the whole script and asks again. End of input counts as quit.
pub struct LinePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LinePrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn present(&mut self, request: &ApprovalRequest) -> io::Result<()> {
        let item = &request.item;
        writeln!(self.output)?;
        writeln!(self.output, "[{}] {}", item.status.as_str(), item.name)?;
        writeln!(self.output, "  staging:  {}", item.staging_path.display())?;
        writeln!(
            self.output,
            "            {} bytes, sha256 {}",
            request.staging_size, request.staging_digest
        )?;
        writeln!(self.output, "  approved: {}", item.approved_path.display())?;
        if let (Some(size), Some(digest)) = (request.approved_size, &request.approved_digest) {
            writeln!(self.output, "            {} bytes, sha256 {}", size, digest)?;
        }
        writeln!(self.output)?;
        self.print_lines(&request.preview)?;
        if request.truncated {
            writeln!(self.output, "     | ... (v to view all)")?;
        }
        Ok(())
    }

    fn print_lines(&mut self, lines: &[String]) -> io::Result<()> {
        for (idx, line) in lines.iter().enumerate() {
            writeln!(self.output, "{:>4} | {}", idx + 1, line)?;
        }
        Ok(())
    }
}

impl<R: BufRead, W: Write> ApprovalPrompt for LinePrompt<R, W> {
    fn decide(&mut self, request: &ApprovalRequest) -> GatewayResult<ApprovalDecision> {
        self.present(request)?;

        loop {
            write!(self.output, "Approve {}? [y/n/v/q] ", request.item.name)?;
            self.output.flush()?;

            let mut answer = String::new();
            if self.input.read_line(&mut answer)? == 0 {
                writeln!(self.output)?;
                return Ok(ApprovalDecision::Quit);
            }

            match answer.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" => return Ok(ApprovalDecision::Approve),
                "n" | "no" => return Ok(ApprovalDecision::Skip),
                "q" | "quit" => return Ok(ApprovalDecision::Quit),
                "v" | "view" => {
                    writeln!(self.output)?;
                    self.print_lines(&request.full_text())?;
                }
                _ => writeln!(self.output, "Please answer y, n, v or q.")?,
            }
        }
    }
}

/// A sync item that could not be installed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub name: String,
    pub error: String,
}

/// Outcome of an interactive sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub approved: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<SyncFailure>,
    /// The operator stopped before the end of the queue
    pub quit: bool,
}

#[derive(Serialize)]
struct ProjectMarker<'a> {
    workspace: &'a Path,
}

/// Diffs staging scripts against the approved store and installs approvals
#[derive(Debug, Clone)]
pub struct ApprovalPipeline {
    workspace: PathBuf,
    staging_dirs: Vec<PathBuf>,
    approved_root: PathBuf,
    project_id: String,
    allowed_extensions: Vec<String>,
    target: ApprovalTarget,
}

impl ApprovalPipeline {
    /// Create a pipeline for `workspace`, staging from the configured tool directories
    pub fn new(config: &HostToolsConfig, workspace: &Path) -> GatewayResult<Self> {
        let workspace = absolute_workspace(workspace)?;
        Ok(Self {
            staging_dirs: config.directories.iter().map(|dir| workspace.join(dir)).collect(),
            approved_root: approved_root(config)?,
            project_id: project_id(&workspace)?,
            allowed_extensions: config.allowed_extensions.clone(),
            target: ApprovalTarget::default(),
            workspace,
        })
    }

    pub fn with_target(mut self, target: ApprovalTarget) -> Self {
        self.target = target;
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Directory approved scripts are copied into
    pub fn target_dir(&self) -> PathBuf {
        match self.target {
            ApprovalTarget::Project => self.approved_root.join(&self.project_id),
            ApprovalTarget::Common => self.approved_root.join(COMMON_DIR),
        }
    }

    /// Status of every staging script against the target directory.
    ///
    /// A script that cannot be compared is logged and left out.
    pub fn detect_changes(&self) -> GatewayResult<Vec<SyncItem>> {
        Ok(self.scan()?.0)
    }

    /// Comparable items, plus the scripts whose comparison failed
    fn scan(&self) -> GatewayResult<(Vec<SyncItem>, Vec<SyncFailure>)> {
        let target = self.target_dir();
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        let mut failed = Vec::new();

        for dir in &self.staging_dirs {
            let entries = match fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(dir = %dir.display(), "Staging directory does not exist");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let mut names: Vec<String> = entries
                .filter_map(Result::ok)
                .filter(|entry| entry.path().is_file())
                .filter_map(|entry| entry.file_name().into_string().ok())
                .filter(|name| !name.starts_with('.'))
                .collect();
            names.sort();

            for name in names {
                if validate_name(&name).is_err() || !self.extension_allowed(&name) {
                    continue;
                }
                if !seen.insert(name.clone()) {
                    continue;
                }

                let staging_path = dir.join(&name);
                let approved_path = target.join(&name);
                let status = match compare_files(&staging_path, &approved_path) {
                    Ok(status) => status,
                    Err(e) => {
                        warn!(tool = %name, error = %e, "Could not compare staging script");
                        failed.push(SyncFailure {
                            name,
                            error: e.to_string(),
                        });
                        continue;
                    }
                };
                items.push(SyncItem {
                    name,
                    status,
                    staging_path,
                    approved_path,
                });
            }
        }

        Ok((items, failed))
    }

    /// Review every new or updated script through `prompt`.
    ///
    /// A failure to compare, read or install one item is recorded in the
    /// report and the queue continues.
    pub fn run_interactive_sync<P: ApprovalPrompt + ?Sized>(
        &self,
        prompt: &mut P,
    ) -> GatewayResult<SyncReport> {
        let target = self.target_dir();
        ensure_dir(&target)?;
        if self.target == ApprovalTarget::Project {
            self.write_project_marker(&target)?;
        }

        let (items, failed) = self.scan()?;
        let mut report = SyncReport {
            failed,
            ..SyncReport::default()
        };
        let pending = items
            .into_iter()
            .filter(|item| item.status != SyncStatus::Unchanged);

        for item in pending {
            let request = match ApprovalRequest::for_item(&item) {
                Ok(request) => request,
                Err(e) => {
                    warn!(tool = %item.name, error = %e, "Could not read staging script");
                    report.failed.push(SyncFailure {
                        name: item.name,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            match prompt.decide(&request)? {
                ApprovalDecision::Approve => match install(&request) {
                    Ok(()) => {
                        info!(tool = %item.name, status = item.status.as_str(), dest = %item.approved_path.display(), "Tool approved");
                        report.approved.push(item.name);
                    }
                    Err(e) => {
                        warn!(tool = %item.name, error = %e, "Failed to install approved tool");
                        report.failed.push(SyncFailure {
                            name: item.name,
                            error: e.to_string(),
                        });
                    }
                },
                ApprovalDecision::Skip => {
                    debug!(tool = %item.name, "Tool skipped");
                    report.skipped.push(item.name);
                }
                ApprovalDecision::Quit => {
                    report.quit = true;
                    break;
                }
            }
        }

        Ok(report)
    }

    fn write_project_marker(&self, target: &Path) -> GatewayResult<()> {
        let marker = ProjectMarker {
            workspace: &self.workspace,
        };
        let json = serde_json::to_string_pretty(&marker)?;
        fs::write(target.join(PROJECT_MARKER), json)
            .map_err(|e| GatewayError::execution_failed("write project marker", e.to_string()))
    }

    fn extension_allowed(&self, name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.allowed_extensions.iter().any(|a| a == ext))
    }
}

/// Write the reviewed bytes with the staging permission bits, then move
/// them over the approved copy
fn install(request: &ApprovalRequest) -> io::Result<()> {
    let dest = &request.item.approved_path;
    if let Some(parent) = dest.parent() {
        ensure_dir(parent)?;
    }

    let partial = dest.with_file_name(format!(".{}.approving", request.item.name));
    let result = fs::write(&partial, &request.content)
        .and_then(|()| fs::set_permissions(&partial, request.permissions.clone()))
        .and_then(|()| fs::rename(&partial, dest));
    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}
