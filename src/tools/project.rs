//! Per-workspace project identifiers and content digests

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Directory under the approved root shared by every project
pub const COMMON_DIR: &str = "_common";

/// Marker file mapping a project directory back to its workspace
pub const PROJECT_MARKER: &str = ".project";

/// `<sanitized basename>-<first 8 hex digits of sha256(absolute path)>`.
///
/// Recomputed from the workspace path on every run; the same path always
/// yields the same id.
pub fn project_id(workspace: &Path) -> io::Result<String> {
    let absolute = absolute_workspace(workspace)?;
    let path_text = absolute.to_string_lossy();

    let digest = hex::encode(Sha256::digest(path_text.as_bytes()));
    let basename = absolute
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(format!("{}-{}", sanitize(&basename), &digest[..8]))
}

/// Absolute form of `workspace`, canonicalized when it exists
pub fn absolute_workspace(workspace: &Path) -> io::Result<PathBuf> {
    match workspace.canonicalize() {
        Ok(path) => Ok(path),
        Err(_) if workspace.is_absolute() => Ok(workspace.to_path_buf()),
        Err(_) => Ok(std::env::current_dir()?.join(workspace)),
    }
}

/// Hex SHA-256 digest of a file's content
pub fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hex SHA-256 digest of an in-memory buffer
pub fn content_digest(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

fn sanitize(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = sanitized.trim_matches('-');
    if trimmed.is_empty() {
        "workspace".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_project_id_is_stable() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path().join("My Project");
        std::fs::create_dir(&workspace).unwrap();

        let first = project_id(&workspace).unwrap();
        let second = project_id(&workspace).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("my-project-"));
        assert_eq!(first.len(), "my-project-".len() + 8);
    }

    #[test]
    fn test_project_id_differs_by_path() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a").join("app");
        let b = dir.path().join("b").join("app");
        std::fs::create_dir_all(&a).unwrap();
        std::fs::create_dir_all(&b).unwrap();

        assert_ne!(project_id(&a).unwrap(), project_id(&b).unwrap());
    }

    #[test]
    fn test_project_id_matches_digest_of_path() {
        let id = project_id(Path::new("/nonexistent/ws")).unwrap();
        let expected = hex::encode(Sha256::digest(b"/nonexistent/ws"));
        assert_eq!(id, format!("ws-{}", &expected[..8]));
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("My Project!"), "my-project");
        assert_eq!(sanitize("..."), "workspace");
        assert_eq!(sanitize("api_v2"), "api_v2");
    }

    #[test]
    fn test_file_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tool.sh");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            file_digest(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(content_digest(b"abc"), file_digest(&path).unwrap());
    }
}
