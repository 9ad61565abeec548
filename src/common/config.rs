//! Test run configuration file handling
//!
//! The configuration describes the testbed (nodes, port links, DPDK build)
//! and the defaults of the scope-overridable local context. It is read once
//! by the harness, which then initializes the runtime context explicitly.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// System under test
    #[serde(default)]
    pub sut: NodeConfig,

    /// Traffic generator node
    #[serde(default)]
    pub tg: NodeConfig,

    /// Port links between the SUT and the TG, in topology order
    #[serde(default)]
    pub links: Vec<LinkConfig>,

    /// DPDK build location on the SUT
    #[serde(default)]
    pub dpdk: DpdkConfig,

    /// Defaults of the local context
    #[serde(default)]
    pub defaults: Defaults,

    /// Test run execution settings
    #[serde(default)]
    pub run: RunConfig,
}

/// Configuration of a testbed node
#[derive(Debug, Deserialize, Clone)]
pub struct NodeConfig {
    /// Unique node name
    pub name: String,

    /// Hostname or IP address used by the session layer
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Logical cores available for DPDK, in lcore list form (e.g. "0-7")
    #[serde(default)]
    pub lcores: String,

    /// Whether lcore 0 may be handed to DPDK applications
    #[serde(default)]
    pub use_first_core: bool,

    /// Number of memory channels passed to EAL
    #[serde(default = "default_memory_channels")]
    pub memory_channels: u32,

    /// Ports of the node
    #[serde(default)]
    pub ports: Vec<PortConfig>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: default_hostname(),
            hostname: default_hostname(),
            lcores: String::new(),
            use_first_core: false,
            memory_channels: default_memory_channels(),
            ports: Vec::new(),
        }
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_memory_channels() -> u32 {
    1
}

/// Configuration of a node port
#[derive(Debug, Deserialize, Clone)]
pub struct PortConfig {
    /// Port name, referenced by links
    pub name: String,
    /// PCI address of the device
    pub pci: String,
}

/// A physical link between a SUT port and a TG port
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    pub sut_port: String,
    pub tg_port: String,
}

/// DPDK build configuration
#[derive(Debug, Deserialize)]
pub struct DpdkConfig {
    /// Build directory on the SUT; application paths are relative to it
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
}

impl Default for DpdkConfig {
    fn default() -> Self {
        Self {
            build_dir: default_build_dir(),
        }
    }
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("dpdk/build")
}

/// Defaults of the local context, restored at the start of each top-level scope
#[derive(Debug, Deserialize)]
pub struct Defaults {
    /// Timeout for session start and command output, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: f64,

    /// Explicit lcore list; takes precedence over `lcore_count`
    #[serde(default)]
    pub lcores: Option<String>,

    /// Lcore count filter used when no explicit list is configured
    #[serde(default)]
    pub lcore_count: LcoreCountConfig,

    /// Pick cores starting from the lowest id
    #[serde(default = "default_true")]
    pub ascending_cores: bool,

    /// Append the run timestamp to DPDK file prefixes
    #[serde(default = "default_true")]
    pub append_prefix_timestamp: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            lcores: None,
            lcore_count: LcoreCountConfig::default(),
            ascending_cores: true,
            append_prefix_timestamp: true,
        }
    }
}

fn default_timeout() -> f64 {
    15.0
}

fn default_true() -> bool {
    true
}

/// Test run execution settings
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RunConfig {
    /// Extra attempts given to a test case that fails verification
    #[serde(default)]
    pub re_run: u32,

    /// Bound on one test case execution, in seconds
    #[serde(default)]
    pub case_timeout_secs: Option<u64>,

    /// Run output directory; the platform data directory when unset
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl RunConfig {
    pub fn case_timeout(&self) -> Option<Duration> {
        self.case_timeout_secs.map(Duration::from_secs)
    }
}

/// Lcore count filter settings
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct LcoreCountConfig {
    #[serde(default = "default_one")]
    pub lcores_per_core: usize,
    #[serde(default = "default_two")]
    pub cores_per_socket: usize,
    #[serde(default = "default_one")]
    pub socket_count: usize,
}

impl Default for LcoreCountConfig {
    fn default() -> Self {
        Self {
            lcores_per_core: default_one(),
            cores_per_socket: default_two(),
            socket_count: default_one(),
        }
    }
}

fn default_one() -> usize {
    1
}
fn default_two() -> usize {
    2
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}
