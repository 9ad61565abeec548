//! DPDK EAL parameters

use crate::common::Result;
use crate::context::Context;
use crate::testbed::{LogicalCoreList, Port};

use super::{Field, ParamSet, RawParams, ToValue, Value};

/// Default EAL file prefix
pub const DEFAULT_PREFIX: &str = "dpdk";

/// A virtual device definition, e.g. `net_ring0`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualDevice(pub String);

impl VirtualDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl ToValue for VirtualDevice {
    fn to_value(&self) -> Value {
        Value::Str(self.0.clone())
    }
}

/// Environment Abstraction Layer parameters shared by every DPDK application
#[derive(Debug, Clone)]
pub struct EalParams {
    pub lcore_list: Option<LogicalCoreList>,
    pub memory_channels: Option<u32>,
    pub no_pci: bool,
    pub prefix: Option<String>,
    pub vdevs: Vec<VirtualDevice>,
    /// `None` lets [`compute_eal_params`] allow the topology's SUT ports
    pub allowed_ports: Option<Vec<Port>>,
    pub blocked_ports: Vec<Port>,
    pub other_eal_param: Option<RawParams>,
    pub suffix: Option<String>,
}

impl Default for EalParams {
    fn default() -> Self {
        Self {
            lcore_list: None,
            memory_channels: None,
            no_pci: false,
            prefix: Some(DEFAULT_PREFIX.to_string()),
            vdevs: Vec::new(),
            allowed_ports: None,
            blocked_ports: Vec::new(),
            other_eal_param: None,
            suffix: None,
        }
    }
}

impl ParamSet for EalParams {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::new("lcore_list", self.lcore_list.as_ref()).short("l"),
            Field::new("memory_channels", self.memory_channels.as_ref()).short("n"),
            Field::switch("no_pci", self.no_pci),
            Field::new("prefix", self.prefix.as_deref()).long("file-prefix"),
            Field::repeated("vdevs", Some(self.vdevs.as_slice())).long("vdev"),
            Field::repeated("allowed_ports", self.allowed_ports.as_deref()).short("a"),
            Field::repeated("blocked_ports", Some(self.blocked_ports.as_slice())).short("b"),
            Field::nested(
                "other_eal_param",
                self.other_eal_param.as_ref().map(|p| p as &dyn ParamSet),
            ),
        ]
    }

    fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }
}

/// Fill the run-dependent parts of `params` from the context
///
/// Lcores come from the SUT through the current lcore filter, the run
/// timestamp is appended to the file prefix when the naming policy asks for
/// it, and allowed ports default to the SUT side of the topology.
pub fn compute_eal_params(ctx: &Context, mut params: EalParams) -> Result<EalParams> {
    let local = ctx.local();

    if params.lcore_list.is_none() {
        let lcores = ctx
            .sut_node
            .filter_lcores(&local.lcore_filter, local.ascending_cores)?;
        params.lcore_list = Some(LogicalCoreList::from(lcores.as_slice()));
    }

    if params.memory_channels.is_none() {
        params.memory_channels = Some(ctx.sut_node.memory_channels);
    }

    if local.append_prefix_timestamp {
        if let Some(prefix) = params.prefix.as_mut() {
            prefix.push('_');
            prefix.push_str(ctx.dpdk.timestamp());
        }
    }

    if params.allowed_ports.is_none() {
        params.allowed_ports = Some(ctx.topology.sut_ports());
    }

    Ok(params)
}

/// Full command line of a DPDK application: `<eal> -- <app>`
#[derive(Debug, Clone)]
pub struct DpdkAppParams<A> {
    pub eal: EalParams,
    pub app: A,
}

impl<A: ParamSet> ParamSet for DpdkAppParams<A> {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::nested("eal", Some(&self.eal as &dyn ParamSet)),
            Field::nested("app", Some(&self.app as &dyn ParamSet)),
        ]
    }

    fn render(&self) -> String {
        let eal = self.eal.render();
        let app = self.app.render();
        match (eal.is_empty(), app.is_empty()) {
            (_, true) => eal,
            (true, false) => format!("-- {}", app),
            (false, false) => format!("{} -- {}", eal, app),
        }
    }
}
