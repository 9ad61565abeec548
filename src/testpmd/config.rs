//! Testpmd command-line parameters
//!
//! [`TestPmdParams`] holds the application part of the testpmd command line;
//! the EAL part comes from [`EalParams`](crate::params::eal::EalParams).

use std::fmt;
use std::path::PathBuf;

use crate::params::{convert, Field, ParamSet, ToValue, Value};

/// Enum whose values render as fixed strings
macro_rules! value_enum {
    ($(#[$meta:meta])* pub enum $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToValue for $name {
            fn to_value(&self) -> Value {
                Value::Str(self.as_str().to_string())
            }
        }
    };
}

value_enum! {
    /// How forwarding ports are paired
    pub enum PortTopology {
        Paired => "paired",
        Chained => "chained",
        Loop => "loop",
    }
}

value_enum! {
    /// Forwarding modes that take no extra options
    pub enum SimpleForwardingMode {
        Io => "io",
        Mac => "mac",
        MacSwap => "macswap",
        RxOnly => "rxonly",
        Csum => "csum",
        IcmpEcho => "icmpecho",
        Ieee1588 => "ieee1588",
        FiveTupleSwap => "5tswap",
        SharedRxq => "shared-rxq",
        RecycleMbufs => "recycle_mbufs",
    }
}

value_enum! {
    /// Testpmd events that can be printed or masked
    pub enum Event {
        Unknown => "unknown",
        QueueState => "queue_state",
        VfMbox => "vf_mbox",
        Macsec => "macsec",
        IntrLsc => "intr_lsc",
        IntrRmv => "intr_rmv",
        IntrReset => "intr_reset",
        DevProbed => "dev_probed",
        DevReleased => "dev_released",
        FlowAged => "flow_aged",
        ErrRecovering => "err_recovering",
        RecoverySuccess => "recovery_success",
        RecoveryFailed => "recovery_failed",
        All => "all",
    }
}

/// Bit set rendered through its numeric value
macro_rules! flag_set {
    ($(#[$meta:meta])* pub struct $name:ident($repr:ty) { $($flag:ident = $value:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name(pub $repr);

        impl $name {
            $(pub const $flag: Self = Self($value);)+

            pub fn bits(&self) -> $repr {
                self.0
            }

            pub fn contains(&self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl ToValue for $name {
            fn to_value(&self) -> Value {
                Value::Int(u64::from(self.0))
            }
        }
    };
}

flag_set! {
    /// Direction of a flow; rendered in decimal
    pub struct FlowDirection(u8) {
        RX = 1 << 0,
        TX = 1 << 1,
    }
}

flag_set! {
    /// Hairpin port configuration; rendered in hex
    pub struct HairpinMode(u32) {
        TWO_PORTS_LOOP = 1 << 0,
        TWO_PORTS_PAIRED = 1 << 1,
        EXPLICIT_TX_FLOW = 1 << 4,
        FORCE_RX_QUEUE_MEM_SETTINGS = 1 << 8,
        FORCE_TX_QUEUE_MEM_SETTINGS = 1 << 9,
        RX_QUEUE_USE_LOCKED_DEVICE_MEMORY = 1 << 12,
        RX_QUEUE_USE_RTE_MEMORY = 1 << 13,
        TX_QUEUE_USE_LOCKED_DEVICE_MEMORY = 1 << 16,
        TX_QUEUE_USE_RTE_MEMORY = 1 << 18,
    }
}

flag_set! {
    /// RX multi-queue mode; rendered in hex
    pub struct RxMultiQueueMode(u8) {
        RSS = 1 << 0,
        DCB = 1 << 1,
        VMDQ = 1 << 2,
    }
}

/// Port to NUMA socket association: `(port,socket)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortNumaConfig {
    pub port: u16,
    pub socket: u32,
}

impl ToValue for PortNumaConfig {
    fn to_value(&self) -> Value {
        Value::Str(format!("({},{})", self.port, self.socket))
    }
}

/// Ring to NUMA socket association: `(port,direction,socket)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingNumaConfig {
    pub port: u16,
    pub direction: FlowDirection,
    pub socket: u32,
}

impl ToValue for RingNumaConfig {
    fn to_value(&self) -> Value {
        Value::Str(format!(
            "({},{},{})",
            self.port,
            self.direction.bits(),
            self.socket
        ))
    }
}

/// MAC address of the peer of a port: `port,mac`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthPeer {
    pub port_no: u16,
    pub mac_address: String,
}

impl ToValue for EthPeer {
    fn to_value(&self) -> Value {
        Value::Str(format!("{},{}", self.port_no, self.mac_address))
    }
}

/// Source and destination IPs of generated packets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIpAddrPair {
    pub source_ip: String,
    pub dest_ip: String,
}

impl ToValue for TxIpAddrPair {
    fn to_value(&self) -> Value {
        Value::Str(format!("{},{}", self.source_ip, self.dest_ip))
    }
}

/// UDP ports of generated packets; the destination defaults to the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxUdpPortPair {
    pub source_port: u16,
    pub dest_port: Option<u16>,
}

impl ToValue for TxUdpPortPair {
    fn to_value(&self) -> Value {
        match self.dest_port {
            Some(dest) => Value::Str(format!("{},{}", self.source_port, dest)),
            None => Value::Int(u64::from(self.source_port)),
        }
    }
}

/// Shared RX queue mode: every port in one group, or groups of N ports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxqShare {
    AllPorts,
    PortsPerGroup(u32),
}

impl RxqShare {
    /// Group size given to `--rxq-share`; `None` shares among all ports
    pub fn ports_per_group(self) -> Option<u32> {
        match self {
            Self::AllPorts => None,
            Self::PortsPerGroup(n) => Some(n),
        }
    }
}

/// Receive side scaling setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RssSetting {
    Disabled,
    IpOnly,
    Udp,
}

impl ParamSet for RssSetting {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::switch("disable_rss", *self == Self::Disabled),
            Field::switch("rss_ip", *self == Self::IpOnly),
            Field::switch("rss_udp", *self == Self::Udp),
        ]
    }
}

/// Options of the noisy forwarding mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoisyForwardingMode {
    pub forward_mode: Option<SimpleForwardingMode>,
    pub tx_sw_buffer_size: Option<u32>,
    pub tx_sw_buffer_flushtime: Option<u32>,
    pub lkup_memory: Option<u32>,
    pub lkup_num_reads: Option<u32>,
    pub lkup_num_writes: Option<u32>,
    pub lkup_num_reads_writes: Option<u32>,
}

impl Default for NoisyForwardingMode {
    fn default() -> Self {
        Self {
            forward_mode: Some(SimpleForwardingMode::Io),
            tx_sw_buffer_size: None,
            tx_sw_buffer_flushtime: None,
            lkup_memory: None,
            lkup_num_reads: None,
            lkup_num_writes: None,
            lkup_num_reads_writes: None,
        }
    }
}

/// Packet forwarding mode set at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardingMode {
    Simple(SimpleForwardingMode),
    TxOnly {
        multi_flow: bool,
        segments_length: Option<Vec<u32>>,
    },
    FlowGen {
        clones: Option<u32>,
        flows: Option<u32>,
        segments_length: Option<Vec<u32>>,
    },
    Noisy(NoisyForwardingMode),
}

impl ForwardingMode {
    fn name(&self) -> &'static str {
        match self {
            Self::Simple(mode) => mode.as_str(),
            Self::TxOnly { .. } => "txonly",
            Self::FlowGen { .. } => "flowgen",
            Self::Noisy(_) => "noisy",
        }
    }
}

impl ParamSet for ForwardingMode {
    fn fields(&self) -> Vec<Field<'_>> {
        let mut fields = vec![Field::new("forward_mode", Some(self.name()))];
        match self {
            Self::Simple(_) => {}
            Self::TxOnly {
                multi_flow,
                segments_length,
            } => {
                fields.push(Field::switch("multi_flow", *multi_flow).long("txonly-multi-flow"));
                fields.push(
                    Field::new("segments_length", segments_length.as_ref())
                        .long("txpkts")
                        .convert(convert::comma_separated),
                );
            }
            Self::FlowGen {
                clones,
                flows,
                segments_length,
            } => {
                fields.push(Field::new("clones", clones.as_ref()).long("flowgen-clones"));
                fields.push(Field::new("flows", flows.as_ref()).long("flowgen-flows"));
                fields.push(
                    Field::new("segments_length", segments_length.as_ref())
                        .long("txpkts")
                        .convert(convert::comma_separated),
                );
            }
            Self::Noisy(noisy) => {
                fields.extend([
                    Field::new("forward_mode", noisy.forward_mode.as_ref())
                        .long("noisy-forward-mode"),
                    Field::new("tx_sw_buffer_size", noisy.tx_sw_buffer_size.as_ref())
                        .long("noisy-tx-sw-buffer-size"),
                    Field::new("tx_sw_buffer_flushtime", noisy.tx_sw_buffer_flushtime.as_ref())
                        .long("noisy-tx-sw-buffer-flushtime"),
                    Field::new("lkup_memory", noisy.lkup_memory.as_ref())
                        .long("noisy-lkup-memory"),
                    Field::new("lkup_num_reads", noisy.lkup_num_reads.as_ref())
                        .long("noisy-lkup-num-reads"),
                    Field::new("lkup_num_writes", noisy.lkup_num_writes.as_ref())
                        .long("noisy-lkup-num-writes"),
                    Field::new("lkup_num_reads_writes", noisy.lkup_num_reads_writes.as_ref())
                        .long("noisy-lkup-num-reads-writes"),
                ]);
            }
        }
        fields
    }
}

/// RX ring parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RxRingParams {
    pub descriptors: Option<u32>,
    pub prefetch_threshold: Option<u32>,
    pub host_threshold: Option<u32>,
    pub write_back_threshold: Option<u32>,
    pub free_threshold: Option<u32>,
}

impl ParamSet for RxRingParams {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::new("descriptors", self.descriptors.as_ref()).long("rxd"),
            Field::new("prefetch_threshold", self.prefetch_threshold.as_ref()).long("rxpt"),
            Field::new("host_threshold", self.host_threshold.as_ref()).long("rxht"),
            Field::new("write_back_threshold", self.write_back_threshold.as_ref()).long("rxwt"),
            Field::new("free_threshold", self.free_threshold.as_ref()).long("rxfreet"),
        ]
    }
}

/// TX ring parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxRingParams {
    pub descriptors: Option<u32>,
    pub rs_bit_threshold: Option<u32>,
    pub prefetch_threshold: Option<u32>,
    pub host_threshold: Option<u32>,
    pub write_back_threshold: Option<u32>,
    pub free_threshold: Option<u32>,
}

impl ParamSet for TxRingParams {
    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::new("descriptors", self.descriptors.as_ref()).long("txd"),
            Field::new("rs_bit_threshold", self.rs_bit_threshold.as_ref()).long("txrst"),
            Field::new("prefetch_threshold", self.prefetch_threshold.as_ref()).long("txpt"),
            Field::new("host_threshold", self.host_threshold.as_ref()).long("txht"),
            Field::new("write_back_threshold", self.write_back_threshold.as_ref()).long("txwt"),
            Field::new("free_threshold", self.free_threshold.as_ref()).long("txfreet"),
        ]
    }
}

/// Mempool allocation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MempoolAllocationMode {
    Native,
    Xmem,
    XmemHuge,
    /// Native DPDK memory populated with anonymous memory
    Anon { no_iova_contig: bool },
}

impl ParamSet for MempoolAllocationMode {
    fn fields(&self) -> Vec<Field<'_>> {
        let (mode, no_iova_contig) = match self {
            Self::Native => ("native", false),
            Self::Xmem => ("xmem", false),
            Self::XmemHuge => ("xmemhuge", false),
            Self::Anon { no_iova_contig } => ("anon", *no_iova_contig),
        };
        vec![
            Field::new("mp_alloc", Some(mode)),
            Field::switch("no_iova_contig", no_iova_contig),
        ]
    }
}

/// Application parameters of testpmd
#[derive(Debug, Clone)]
pub struct TestPmdParams {
    pub interactive_mode: bool,
    pub auto_start: bool,
    pub tx_first: bool,
    pub stats_period: Option<u32>,
    pub display_xstats: Option<Vec<String>>,
    pub nb_cores: Option<u32>,
    pub coremask: Option<u64>,
    pub nb_ports: Option<u32>,
    pub port_topology: Option<PortTopology>,
    pub portmask: Option<u64>,
    pub portlist: Option<String>,

    pub numa: Option<bool>,
    pub socket_num: Option<u32>,
    pub port_numa_config: Option<Vec<PortNumaConfig>>,
    pub ring_numa_config: Option<Vec<RingNumaConfig>>,
    pub total_num_mbufs: Option<u32>,
    pub mbuf_size: Option<Vec<u32>>,
    pub mbcache: Option<u32>,
    pub max_pkt_len: Option<u32>,
    pub eth_peers_configfile: Option<PathBuf>,
    pub eth_peer: Option<Vec<EthPeer>>,
    pub tx_ip: Option<TxIpAddrPair>,
    pub tx_udp: Option<TxUdpPortPair>,
    pub enable_lro: bool,
    pub max_lro_pkt_size: Option<u32>,
    pub disable_crc_strip: bool,
    pub enable_scatter: bool,
    pub enable_hw_vlan: bool,
    pub enable_hw_vlan_filter: bool,
    pub enable_hw_vlan_strip: bool,
    pub enable_hw_vlan_extend: bool,
    pub enable_hw_qinq_strip: bool,
    pub pkt_drop_enabled: bool,
    pub rss: Option<RssSetting>,
    pub forward_mode: Option<ForwardingMode>,
    pub hairpin_mode: Option<HairpinMode>,
    pub hairpin_queues: Option<u32>,
    pub burst: Option<u32>,
    pub enable_rx_cksum: bool,

    pub rx_queues: Option<u32>,
    pub rx_ring: Option<RxRingParams>,
    pub no_flush_rx: bool,
    pub rx_segments_offsets: Option<Vec<u32>>,
    pub rx_segments_length: Option<Vec<u32>>,
    pub multi_rx_mempool: bool,
    pub rx_shared_queue: Option<RxqShare>,
    pub rx_offloads: Option<u64>,
    pub rx_mq_mode: Option<RxMultiQueueMode>,

    pub tx_queues: Option<u32>,
    pub tx_ring: Option<TxRingParams>,
    pub tx_offloads: Option<u64>,

    pub eth_link_speed: Option<u32>,
    pub disable_link_check: bool,
    pub disable_device_start: bool,
    pub no_lsc_interrupt: bool,
    pub no_rmv_interrupt: bool,
    pub bitrate_stats: Option<u32>,
    pub latencystats: Option<u32>,
    pub print_events: Option<Vec<Event>>,
    pub mask_events: Option<Vec<Event>>,

    pub flow_isolate_all: bool,
    pub disable_flow_flush: bool,

    pub hot_plug: bool,
    pub vxlan_gpe_port: Option<u16>,
    pub geneve_parsed_port: Option<u16>,
    pub lock_all_memory: Option<bool>,
    pub mempool_allocation_mode: Option<MempoolAllocationMode>,
    pub record_core_cycles: bool,
    pub record_burst_status: bool,
}

impl Default for TestPmdParams {
    fn default() -> Self {
        Self {
            interactive_mode: true,
            auto_start: false,
            tx_first: false,
            stats_period: None,
            display_xstats: None,
            nb_cores: None,
            coremask: None,
            nb_ports: None,
            port_topology: Some(PortTopology::Paired),
            portmask: None,
            portlist: None,
            numa: None,
            socket_num: None,
            port_numa_config: None,
            ring_numa_config: None,
            total_num_mbufs: None,
            mbuf_size: None,
            mbcache: None,
            max_pkt_len: None,
            eth_peers_configfile: None,
            eth_peer: None,
            tx_ip: None,
            tx_udp: None,
            enable_lro: false,
            max_lro_pkt_size: None,
            disable_crc_strip: false,
            enable_scatter: false,
            enable_hw_vlan: false,
            enable_hw_vlan_filter: false,
            enable_hw_vlan_strip: false,
            enable_hw_vlan_extend: false,
            enable_hw_qinq_strip: false,
            pkt_drop_enabled: false,
            rss: None,
            forward_mode: None,
            hairpin_mode: None,
            hairpin_queues: None,
            burst: None,
            enable_rx_cksum: false,
            rx_queues: None,
            rx_ring: None,
            no_flush_rx: false,
            rx_segments_offsets: None,
            rx_segments_length: None,
            multi_rx_mempool: false,
            rx_shared_queue: None,
            rx_offloads: None,
            rx_mq_mode: None,
            tx_queues: None,
            tx_ring: None,
            tx_offloads: None,
            eth_link_speed: None,
            disable_link_check: false,
            disable_device_start: false,
            no_lsc_interrupt: false,
            no_rmv_interrupt: false,
            bitrate_stats: None,
            latencystats: None,
            print_events: None,
            mask_events: Some(vec![Event::IntrLsc]),
            flow_isolate_all: false,
            disable_flow_flush: false,
            hot_plug: false,
            vxlan_gpe_port: None,
            geneve_parsed_port: None,
            lock_all_memory: None,
            mempool_allocation_mode: None,
            record_core_cycles: false,
            record_burst_status: false,
        }
    }
}

fn nested<P: ParamSet>(params: &Option<P>) -> Option<&dyn ParamSet> {
    params.as_ref().map(|p| p as &dyn ParamSet)
}

impl ParamSet for TestPmdParams {
    fn fields(&self) -> Vec<Field<'_>> {
        use convert::{comma_separated, hex};

        vec![
            Field::switch("interactive_mode", self.interactive_mode).short("i"),
            Field::switch("auto_start", self.auto_start).short("a"),
            Field::switch("tx_first", self.tx_first),
            Field::new("stats_period", self.stats_period.as_ref()),
            Field::new("display_xstats", self.display_xstats.as_ref()).convert(comma_separated),
            Field::new("nb_cores", self.nb_cores.as_ref()),
            Field::new("coremask", self.coremask.as_ref()).convert(hex),
            Field::new("nb_ports", self.nb_ports.as_ref()),
            Field::new("port_topology", self.port_topology.as_ref()),
            Field::new("portmask", self.portmask.as_ref()).convert(hex),
            Field::new("portlist", self.portlist.as_deref()),
            Field::yes_no("numa", self.numa),
            Field::new("socket_num", self.socket_num.as_ref()),
            Field::new("port_numa_config", self.port_numa_config.as_ref())
                .convert(comma_separated),
            Field::new("ring_numa_config", self.ring_numa_config.as_ref())
                .convert(comma_separated),
            Field::new("total_num_mbufs", self.total_num_mbufs.as_ref()),
            Field::new("mbuf_size", self.mbuf_size.as_ref()).convert(comma_separated),
            Field::new("mbcache", self.mbcache.as_ref()),
            Field::new("max_pkt_len", self.max_pkt_len.as_ref()),
            Field::new("eth_peers_configfile", self.eth_peers_configfile.as_ref()),
            Field::repeated("eth_peer", self.eth_peer.as_deref()),
            Field::new("tx_ip", self.tx_ip.as_ref()),
            Field::new("tx_udp", self.tx_udp.as_ref()),
            Field::switch("enable_lro", self.enable_lro),
            Field::new("max_lro_pkt_size", self.max_lro_pkt_size.as_ref()),
            Field::switch("disable_crc_strip", self.disable_crc_strip),
            Field::switch("enable_scatter", self.enable_scatter),
            Field::switch("enable_hw_vlan", self.enable_hw_vlan),
            Field::switch("enable_hw_vlan_filter", self.enable_hw_vlan_filter),
            Field::switch("enable_hw_vlan_strip", self.enable_hw_vlan_strip),
            Field::switch("enable_hw_vlan_extend", self.enable_hw_vlan_extend),
            Field::switch("enable_hw_qinq_strip", self.enable_hw_qinq_strip),
            Field::switch("pkt_drop_enabled", self.pkt_drop_enabled).long("enable-drop-en"),
            Field::nested("rss", nested(&self.rss)),
            Field::nested("forward_mode", nested(&self.forward_mode)),
            Field::new("hairpin_mode", self.hairpin_mode.as_ref()).convert(hex),
            Field::new("hairpin_queues", self.hairpin_queues.as_ref()).long("hairpinq"),
            Field::new("burst", self.burst.as_ref()),
            Field::switch("enable_rx_cksum", self.enable_rx_cksum),
            Field::new("rx_queues", self.rx_queues.as_ref()).long("rxq"),
            Field::nested("rx_ring", nested(&self.rx_ring)),
            Field::switch("no_flush_rx", self.no_flush_rx),
            Field::new("rx_segments_offsets", self.rx_segments_offsets.as_ref())
                .long("rxoffs")
                .convert(comma_separated),
            Field::new("rx_segments_length", self.rx_segments_length.as_ref())
                .long("rxpkts")
                .convert(comma_separated),
            Field::switch("multi_rx_mempool", self.multi_rx_mempool),
            Field::switch_or_value(
                "rx_shared_queue",
                self.rx_shared_queue.map(RxqShare::ports_per_group),
            )
            .long("rxq-share"),
            Field::new("rx_offloads", self.rx_offloads.as_ref()).convert(hex),
            Field::new("rx_mq_mode", self.rx_mq_mode.as_ref()).convert(hex),
            Field::new("tx_queues", self.tx_queues.as_ref()).long("txq"),
            Field::nested("tx_ring", nested(&self.tx_ring)),
            Field::new("tx_offloads", self.tx_offloads.as_ref()).convert(hex),
            Field::new("eth_link_speed", self.eth_link_speed.as_ref()),
            Field::switch("disable_link_check", self.disable_link_check),
            Field::switch("disable_device_start", self.disable_device_start),
            Field::switch("no_lsc_interrupt", self.no_lsc_interrupt),
            Field::switch("no_rmv_interrupt", self.no_rmv_interrupt),
            Field::new("bitrate_stats", self.bitrate_stats.as_ref()),
            Field::new("latencystats", self.latencystats.as_ref()),
            Field::repeated("print_events", self.print_events.as_deref()).long("print-event"),
            Field::repeated("mask_events", self.mask_events.as_deref()).long("mask-event"),
            Field::switch("flow_isolate_all", self.flow_isolate_all),
            Field::switch("disable_flow_flush", self.disable_flow_flush),
            Field::switch("hot_plug", self.hot_plug),
            Field::new("vxlan_gpe_port", self.vxlan_gpe_port.as_ref()),
            Field::new("geneve_parsed_port", self.geneve_parsed_port.as_ref()),
            Field::yes_no("lock_all_memory", self.lock_all_memory).long("mlockall"),
            Field::nested("mempool_allocation_mode", nested(&self.mempool_allocation_mode)),
            Field::switch("record_core_cycles", self.record_core_cycles),
            Field::switch("record_burst_status", self.record_burst_status),
        ]
    }
}
