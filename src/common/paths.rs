//! Configuration and output paths
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/dts/` and `~/.local/share/dts/`
//! - macOS: `~/Library/Application Support/dts/`

use std::path::{Path, PathBuf};

use super::{Error, Result};

/// Name used for the project directories
const PROJECT_NAME: &str = "dts";

/// Environment variable overriding the configuration file location
pub const CONFIG_ENV: &str = "DTS_CONFIG";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", PROJECT_NAME)
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
///
/// `$DTS_CONFIG` wins over the platform default.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the run output directory (logs of each test run)
pub fn output_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", PROJECT_NAME)
        .map(|dirs| dirs.data_dir().join("output"))
}

/// Create the run output directory, `dir` or the platform default
pub fn ensure_output_dir(dir: Option<&Path>) -> Result<PathBuf> {
    let dir = match dir {
        Some(dir) => dir.to_path_buf(),
        None => output_dir()
            .ok_or_else(|| Error::Config("no home directory for run output".to_string()))?,
    };
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
