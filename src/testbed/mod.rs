//! Testbed model: nodes, logical cores, port topology and the DPDK build

pub mod cpu;
pub mod dpdk;
pub mod node;
pub mod topology;

pub use cpu::{LcoreFilter, LogicalCore, LogicalCoreCount, LogicalCoreList};
pub use dpdk::DpdkBuild;
pub use node::{Node, Port};
pub use topology::{LinkTopology, PortLink, Topology};
