//! DPDK build location on the SUT

use std::path::{Path, PathBuf};

/// Where DPDK applications live, and the naming data of the current run
#[derive(Debug, Clone)]
pub struct DpdkBuild {
    build_dir: PathBuf,
    /// Run timestamp, appended to file prefixes when the naming policy asks for it
    timestamp: String,
}

impl DpdkBuild {
    pub fn new(build_dir: impl Into<PathBuf>) -> Self {
        Self::with_timestamp(
            build_dir,
            chrono::Local::now().format("%Y%m%d%H%M%S").to_string(),
        )
    }

    pub fn with_timestamp(build_dir: impl Into<PathBuf>, timestamp: impl Into<String>) -> Self {
        Self {
            build_dir: build_dir.into(),
            timestamp: timestamp.into(),
        }
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Path of an application relative to the build directory
    pub fn app_path(&self, app: impl AsRef<Path>) -> PathBuf {
        self.build_dir.join(app)
    }
}
