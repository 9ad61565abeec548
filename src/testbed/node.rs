//! Testbed nodes and their ports

use std::fmt;

use crate::common::config::NodeConfig;
use crate::common::{Error, Result};
use crate::params::{ToValue, Value};

use super::cpu::{filter_lcores, LcoreFilter, LogicalCore, LogicalCoreList};

/// A network port of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    /// Port name, unique within the node
    pub name: String,
    /// PCI address of the device
    pub pci: String,
}

impl Port {
    pub fn new(name: impl Into<String>, pci: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pci: pci.into(),
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pci)
    }
}

/// Ports render as their PCI address (EAL allow/block lists)
impl ToValue for Port {
    fn to_value(&self) -> Value {
        Value::Str(self.pci.clone())
    }
}

/// A testbed node: the system under test or the traffic generator
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub hostname: String,
    /// Lcores DPDK applications may use
    pub lcores: Vec<LogicalCore>,
    pub memory_channels: u32,
    pub ports: Vec<Port>,
}

impl Node {
    /// Find a port by name
    pub fn port(&self, name: &str) -> Result<&Port> {
        self.ports
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| Error::PortNotFound {
                node: self.name.clone(),
                port: name.to_string(),
            })
    }

    /// Pick lcores of this node for one application
    pub fn filter_lcores(&self, filter: &LcoreFilter, ascending: bool) -> Result<Vec<LogicalCore>> {
        let lcores = filter_lcores(&self.name, &self.lcores, filter, ascending)?;
        tracing::debug!(
            node = %self.name,
            %filter,
            ascending,
            lcores = %LogicalCoreList::from(lcores.as_slice()),
            "Filtered lcores"
        );
        Ok(lcores)
    }
}

impl TryFrom<&NodeConfig> for Node {
    type Error = Error;

    /// Lcores listed in the configuration are each treated as a separate
    /// physical core on socket 0; lcore 0 is dropped unless allowed.
    fn try_from(config: &NodeConfig) -> Result<Self> {
        let list: LogicalCoreList = config.lcores.parse()?;
        let lcores = list
            .lcores()
            .iter()
            .filter(|&&id| config.use_first_core || id != 0)
            .map(|&id| LogicalCore::new(id, id, 0))
            .collect();

        Ok(Self {
            name: config.name.clone(),
            hostname: config.hostname.clone(),
            lcores,
            memory_channels: config.memory_channels,
            ports: config
                .ports
                .iter()
                .map(|p| Port::new(&p.name, &p.pci))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::PortConfig;

    fn config() -> NodeConfig {
        NodeConfig {
            name: "sut1".to_string(),
            lcores: "0-3".to_string(),
            ports: vec![PortConfig {
                name: "p0".to_string(),
                pci: "0000:00:08.0".to_string(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_node_from_config_skips_first_core() {
        let node = Node::try_from(&config()).unwrap();
        let ids: Vec<u32> = node.lcores.iter().map(|c| c.lcore).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let node = Node::try_from(&NodeConfig {
            use_first_core: true,
            ..config()
        })
        .unwrap();
        assert_eq!(node.lcores.len(), 4);
    }

    #[test]
    fn test_port_lookup() {
        let node = Node::try_from(&config()).unwrap();
        assert_eq!(node.port("p0").unwrap().pci, "0000:00:08.0");
        assert!(matches!(
            node.port("p9"),
            Err(Error::PortNotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_lcores_in_config() {
        let bad = NodeConfig {
            lcores: "x-y".to_string(),
            ..config()
        };
        assert!(Node::try_from(&bad).is_err());
    }
}
