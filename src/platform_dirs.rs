/// Cross-platform directory management for the gateway
///
/// Uses the `dirs` crate to place operator-owned state outside any workspace
/// the sandboxed assistant can write to:
/// - Linux/Unix: XDG Base Directory Specification
/// - macOS: Apple directory guidelines
/// - Windows: Windows directory standards
use anyhow::{anyhow, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "mcp-gateway";

/// Get the data directory for the gateway
///
/// - Linux: `$XDG_DATA_HOME/mcp-gateway` or `~/.local/share/mcp-gateway`
/// - macOS: `~/Library/Application Support/mcp-gateway`
/// - Windows: `%LOCALAPPDATA%\mcp-gateway`
pub fn data_dir() -> Result<PathBuf> {
    let base_dir =
        dirs::data_local_dir().ok_or_else(|| anyhow!("Unable to determine data directory"))?;
    Ok(base_dir.join(APP_DIR))
}

/// Get the config directory for the gateway
pub fn config_dir() -> Result<PathBuf> {
    let base_dir =
        dirs::config_dir().ok_or_else(|| anyhow!("Unable to determine config directory"))?;
    Ok(base_dir.join(APP_DIR))
}

/// Default configuration file, `<config dir>/config.toml`
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Root of the approved tool store, holding `_common/` and one directory per project
pub fn approved_tools_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join("approved-tools"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> io::Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_data_dir() {
        let dir = data_dir().unwrap();
        assert!(dir.to_string_lossy().contains("mcp-gateway"));
    }

    #[test]
    fn test_platform_specific_paths() {
        let config = config_dir().unwrap();

        if cfg!(target_os = "linux") {
            let config_str = config.to_string_lossy();
            let xdg_config_home = std::env::var("XDG_CONFIG_HOME").ok();
            if let Some(xdg_config) = xdg_config_home {
                assert!(config_str.starts_with(&xdg_config),
                    "Config directory should start with XDG_CONFIG_HOME: {} but got: {}", xdg_config, config_str);
            } else if let Ok(home) = std::env::var("HOME") {
                let expected = format!("{}/.config", home);
                assert!(config_str.starts_with(&expected),
                    "Config directory should start with $HOME/.config: {} but got: {}", expected, config_str);
            }
        } else if cfg!(target_os = "macos") {
            assert!(data_dir()
                .unwrap()
                .to_string_lossy()
                .contains("Library/Application Support"));
        }
    }

    #[test]
    fn test_subdirectories() {
        assert!(approved_tools_dir().unwrap().ends_with("approved-tools"));
        assert_eq!(config_file().unwrap().file_name().unwrap(), "config.toml");
    }

    #[test]
    fn test_ensure_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
        ensure_dir(&nested).unwrap();
    }
}
