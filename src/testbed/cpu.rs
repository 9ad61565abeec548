//! Logical cores and core selection
//!
//! DPDK applications are pinned to logical cores (lcores). A node exposes its
//! lcores with their physical core and socket; an [`LcoreFilter`] picks the
//! subset handed to one application.

use std::fmt;
use std::str::FromStr;

use crate::common::{Error, Result};
use crate::params::{ToValue, Value};

/// Upper bound on lcore ids accepted in a core list
pub const MAX_LCORE: u32 = 4096;

/// A logical core of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogicalCore {
    /// Logical core id, as known to the OS
    pub lcore: u32,
    /// Physical core the lcore runs on
    pub core: u32,
    /// CPU socket of the core
    pub socket: u32,
}

impl LogicalCore {
    pub fn new(lcore: u32, core: u32, socket: u32) -> Self {
        Self { lcore, core, socket }
    }
}

/// An ordered set of lcore ids, written in DPDK range form (`0-3,5`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicalCoreList {
    lcores: Vec<u32>,
}

impl LogicalCoreList {
    /// Build a list from lcore ids; duplicates are dropped and ids sorted
    pub fn new(lcores: impl IntoIterator<Item = u32>) -> Self {
        let mut lcores: Vec<u32> = lcores.into_iter().collect();
        lcores.sort_unstable();
        lcores.dedup();
        Self { lcores }
    }

    pub fn lcores(&self) -> &[u32] {
        &self.lcores
    }

    pub fn len(&self) -> usize {
        self.lcores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lcores.is_empty()
    }

    pub fn contains(&self, lcore: u32) -> bool {
        self.lcores.binary_search(&lcore).is_ok()
    }
}

impl From<&[LogicalCore]> for LogicalCoreList {
    fn from(cores: &[LogicalCore]) -> Self {
        Self::new(cores.iter().map(|c| c.lcore))
    }
}

impl FromStr for LogicalCoreList {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidCoreList(s.to_string());
        let mut lcores = Vec::new();

        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once('-') {
                Some((start, end)) => {
                    let start: u32 = start.trim().parse().map_err(|_| invalid())?;
                    let end: u32 = end.trim().parse().map_err(|_| invalid())?;
                    if start > end || end >= MAX_LCORE {
                        return Err(invalid());
                    }
                    lcores.extend(start..=end);
                }
                None => {
                    let lcore: u32 = part.parse().map_err(|_| invalid())?;
                    if lcore >= MAX_LCORE {
                        return Err(invalid());
                    }
                    lcores.push(lcore);
                }
            }
        }

        Ok(Self::new(lcores))
    }
}

impl fmt::Display for LogicalCoreList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ranges = Vec::new();
        let mut iter = self.lcores.iter().copied().peekable();

        while let Some(start) = iter.next() {
            let mut end = start;
            while iter.peek() == Some(&(end + 1)) {
                end += 1;
                iter.next();
            }
            if start == end {
                ranges.push(start.to_string());
            } else {
                ranges.push(format!("{}-{}", start, end));
            }
        }

        f.write_str(&ranges.join(","))
    }
}

impl ToValue for LogicalCoreList {
    fn to_value(&self) -> Value {
        Value::Str(self.to_string())
    }
}

/// How many lcores to pick, grouped by socket and physical core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalCoreCount {
    pub lcores_per_core: usize,
    pub cores_per_socket: usize,
    pub socket_count: usize,
}

impl Default for LogicalCoreCount {
    fn default() -> Self {
        Self {
            lcores_per_core: 1,
            cores_per_socket: 2,
            socket_count: 1,
        }
    }
}

impl fmt::Display for LogicalCoreCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} socket(s) x {} core(s) x {} lcore(s)",
            self.socket_count, self.cores_per_socket, self.lcores_per_core
        )
    }
}

/// Selection policy for the lcores handed to an application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LcoreFilter {
    Count(LogicalCoreCount),
    List(LogicalCoreList),
}

impl Default for LcoreFilter {
    fn default() -> Self {
        Self::Count(LogicalCoreCount::default())
    }
}

impl fmt::Display for LcoreFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(count) => write!(f, "{}", count),
            Self::List(list) => write!(f, "lcores {}", list),
        }
    }
}

/// Pick lcores from `available` according to `filter`
///
/// `ascending` decides whether selection starts at the lowest or the highest
/// lcore id. The result keeps the selection order.
pub fn filter_lcores(
    node: &str,
    available: &[LogicalCore],
    filter: &LcoreFilter,
    ascending: bool,
) -> Result<Vec<LogicalCore>> {
    let mut sorted = available.to_vec();
    sorted.sort_by_key(|c| c.lcore);
    if !ascending {
        sorted.reverse();
    }

    let not_enough = || Error::NotEnoughCores {
        node: node.to_string(),
        requested: filter.to_string(),
        available: available.len(),
    };

    match filter {
        LcoreFilter::List(list) => {
            let selected: Vec<LogicalCore> = sorted
                .into_iter()
                .filter(|c| list.contains(c.lcore))
                .collect();
            if selected.len() != list.len() {
                return Err(not_enough());
            }
            Ok(selected)
        }
        LcoreFilter::Count(count) => {
            // socket -> physical core -> lcores, in first-seen order
            let mut sockets: Vec<(u32, Vec<(u32, Vec<LogicalCore>)>)> = Vec::new();
            for lcore in sorted {
                let index = match sockets.iter().position(|(s, _)| *s == lcore.socket) {
                    Some(i) => i,
                    None => {
                        sockets.push((lcore.socket, Vec::new()));
                        sockets.len() - 1
                    }
                };
                let socket = &mut sockets[index].1;
                match socket.iter_mut().find(|(c, _)| *c == lcore.core) {
                    Some((_, lcores)) => lcores.push(lcore),
                    None => socket.push((lcore.core, vec![lcore])),
                }
            }

            if sockets.len() < count.socket_count {
                return Err(not_enough());
            }

            let mut selected = Vec::new();
            for (_, cores) in sockets.iter().take(count.socket_count) {
                if cores.len() < count.cores_per_socket {
                    return Err(not_enough());
                }
                for (_, lcores) in cores.iter().take(count.cores_per_socket) {
                    if lcores.len() < count.lcores_per_core {
                        return Err(not_enough());
                    }
                    selected.extend(lcores.iter().take(count.lcores_per_core));
                }
            }
            Ok(selected)
        }
    }
}
