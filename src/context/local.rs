//! Scope-overridable part of the runtime context

use std::time::Duration;

use crate::common::config::Defaults;
use crate::common::{Error, Result};
use crate::testbed::{LcoreFilter, LogicalCoreCount};

/// Default timeout for session start and command output
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// State of the test unit currently executing
#[derive(Debug, Clone, PartialEq)]
pub struct LocalContext {
    pub current_test_suite: Option<String>,
    pub current_test_case: Option<String>,
    /// Lcores handed to DPDK applications
    pub lcore_filter: LcoreFilter,
    /// Pick lcores starting from the lowest id
    pub ascending_cores: bool,
    /// Append the run timestamp to DPDK file prefixes
    pub append_prefix_timestamp: bool,
    /// Bound on session start and command output
    pub timeout: Duration,
}

impl Default for LocalContext {
    fn default() -> Self {
        Self {
            current_test_suite: None,
            current_test_case: None,
            lcore_filter: LcoreFilter::default(),
            ascending_cores: true,
            append_prefix_timestamp: true,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl TryFrom<&Defaults> for LocalContext {
    type Error = Error;

    fn try_from(defaults: &Defaults) -> Result<Self> {
        let lcore_filter = match &defaults.lcores {
            Some(list) => LcoreFilter::List(list.parse()?),
            None => LcoreFilter::Count(LogicalCoreCount {
                lcores_per_core: defaults.lcore_count.lcores_per_core,
                cores_per_socket: defaults.lcore_count.cores_per_socket,
                socket_count: defaults.lcore_count.socket_count,
            }),
        };
        let timeout = Duration::try_from_secs_f64(defaults.timeout_secs).map_err(|e| {
            Error::Config(format!("invalid timeout {}: {}", defaults.timeout_secs, e))
        })?;

        Ok(Self {
            lcore_filter,
            ascending_cores: defaults.ascending_cores,
            append_prefix_timestamp: defaults.append_prefix_timestamp,
            timeout,
            ..Self::default()
        })
    }
}

/// One overridable field of [`LocalContext`] with its new value
#[derive(Debug, Clone, PartialEq)]
pub enum LocalField {
    CurrentTestSuite(Option<String>),
    CurrentTestCase(Option<String>),
    LcoreFilter(LcoreFilter),
    AscendingCores(bool),
    AppendPrefixTimestamp(bool),
    Timeout(Duration),
}

impl LocalField {
    /// Store this value in `local`, returning the value it displaced
    pub(crate) fn swap_into(self, local: &mut LocalContext) -> LocalField {
        use std::mem::replace;

        match self {
            Self::CurrentTestSuite(v) => {
                Self::CurrentTestSuite(replace(&mut local.current_test_suite, v))
            }
            Self::CurrentTestCase(v) => {
                Self::CurrentTestCase(replace(&mut local.current_test_case, v))
            }
            Self::LcoreFilter(v) => Self::LcoreFilter(replace(&mut local.lcore_filter, v)),
            Self::AscendingCores(v) => Self::AscendingCores(replace(&mut local.ascending_cores, v)),
            Self::AppendPrefixTimestamp(v) => {
                Self::AppendPrefixTimestamp(replace(&mut local.append_prefix_timestamp, v))
            }
            Self::Timeout(v) => Self::Timeout(replace(&mut local.timeout, v)),
        }
    }
}
