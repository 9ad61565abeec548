//! Port-link topology between the SUT and the TG

use crate::common::config::LinkConfig;
use crate::common::Result;

use super::node::{Node, Port};

/// Number of links between the nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinkTopology {
    NoLink,
    OneLink,
    TwoLinks,
}

impl LinkTopology {
    fn from_link_count(count: usize) -> Self {
        match count {
            0 => Self::NoLink,
            1 => Self::OneLink,
            _ => Self::TwoLinks,
        }
    }
}

/// A physical link between a SUT port and a TG port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortLink {
    pub sut_port: Port,
    pub tg_port: Port,
}

/// Ordered port links of a test run
#[derive(Debug, Clone)]
pub struct Topology {
    links: Vec<PortLink>,
    kind: LinkTopology,
}

impl Topology {
    pub fn from_port_links(links: impl IntoIterator<Item = PortLink>) -> Self {
        let links: Vec<PortLink> = links.into_iter().collect();
        let kind = LinkTopology::from_link_count(links.len());
        Self { links, kind }
    }

    /// Resolve configured links against the nodes' ports
    pub fn from_config(links: &[LinkConfig], sut: &Node, tg: &Node) -> Result<Self> {
        let links = links
            .iter()
            .map(|link| {
                Ok(PortLink {
                    sut_port: sut.port(&link.sut_port)?.clone(),
                    tg_port: tg.port(&link.tg_port)?.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_port_links(links))
    }

    pub fn kind(&self) -> LinkTopology {
        self.kind
    }

    pub fn links(&self) -> &[PortLink] {
        &self.links
    }

    /// SUT side of every link, in link order
    pub fn sut_ports(&self) -> Vec<Port> {
        self.links.iter().map(|l| l.sut_port.clone()).collect()
    }

    /// TG side of every link, in link order
    pub fn tg_ports(&self) -> Vec<Port> {
        self.links.iter().map(|l| l.tg_port.clone()).collect()
    }
}
