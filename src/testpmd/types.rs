//! Decoded testpmd command output

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use regex::RegexBuilder;

use crate::common::{Error, Result};
use crate::parser::{find_int, flag, named, text, Fields, Rule, TextParser};

const MAC_ADDRESS: &str = r"(?:[\da-fA-F]{2}:){5}[\da-fA-F]{2}";

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

/// `show port stats <port>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortStats {
    pub port_id: u64,
    pub rx_packets: u64,
    pub rx_missed: u64,
    pub rx_bytes: u64,
    pub rx_errors: u64,
    pub rx_nombuf: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    pub tx_bytes: u64,
    pub rx_pps: u64,
    pub rx_bps: u64,
    pub tx_pps: u64,
    pub tx_bps: u64,
}

impl TextParser for PortStats {
    fn parse(output: &str) -> Result<Self> {
        let f = Fields::new::<Self>(output);
        Ok(Self {
            port_id: f.required("port_id", find_int(r"NIC statistics for port (\d+)"))?,
            rx_packets: f.required("rx_packets", find_int(r"RX-packets:\s+(\d+)"))?,
            rx_missed: f.required("rx_missed", find_int(r"RX-missed:\s+(\d+)"))?,
            rx_bytes: f.required("rx_bytes", find_int(r"RX-bytes:\s+(\d+)"))?,
            rx_errors: f.required("rx_errors", find_int(r"RX-errors:\s+(\d+)"))?,
            rx_nombuf: f.required("rx_nombuf", find_int(r"RX-nombuf:\s+(\d+)"))?,
            tx_packets: f.required("tx_packets", find_int(r"TX-packets:\s+(\d+)"))?,
            tx_errors: f.required("tx_errors", find_int(r"TX-errors:\s+(\d+)"))?,
            tx_bytes: f.required("tx_bytes", find_int(r"TX-bytes:\s+(\d+)"))?,
            rx_pps: f.required("rx_pps", find_int(r"Rx-pps:\s+(\d+)"))?,
            rx_bps: f.required("rx_bps", find_int(r"Rx-bps:\s+(\d+)"))?,
            tx_pps: f.required("tx_pps", find_int(r"Tx-pps:\s+(\d+)"))?,
            tx_bps: f.required("tx_bps", find_int(r"Tx-bps:\s+(\d+)"))?,
        })
    }
}

/// Part of `show rxq|txq info` common to both directions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    pub prefetch_threshold: u64,
    pub host_threshold: u64,
    pub writeback_threshold: u64,
    pub free_threshold: u64,
    pub deferred_start: bool,
    pub ring_size: u64,
    pub is_queue_started: bool,
    pub burst_mode: Option<String>,
}

impl TextParser for QueueInfo {
    fn parse(output: &str) -> Result<Self> {
        let f = Fields::new::<Self>(output);
        Ok(Self {
            prefetch_threshold: f
                .required("prefetch_threshold", find_int(r"prefetch threshold: (\d+)"))?,
            host_threshold: f.required("host_threshold", find_int(r"host threshold: (\d+)"))?,
            writeback_threshold: f
                .required("writeback_threshold", find_int(r"writeback threshold: (\d+)"))?,
            free_threshold: f.required("free_threshold", find_int(r"free threshold: (\d+)"))?,
            deferred_start: f.required("deferred_start", flag("deferred start: on"))?,
            ring_size: f.required("ring_size", find_int(r"Number of (?:RXDs|TXDs): (\d+)"))?,
            is_queue_started: f.required("is_queue_started", flag("queue state: started"))?,
            burst_mode: f.optional("burst_mode", text(r"Burst mode: ([^\r\n]+)"))?,
        })
    }
}

/// `show txq info <port> <queue>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxqInfo {
    pub queue: QueueInfo,
    pub rs_threshold: Option<u64>,
}

impl TextParser for TxqInfo {
    fn parse(output: &str) -> Result<Self> {
        let f = Fields::new::<Self>(output);
        Ok(Self {
            queue: QueueInfo::parse(output)?,
            rs_threshold: f.optional("rs_threshold", find_int(r"TX RS threshold: (\d+)\b"))?,
        })
    }
}

/// State of an RX queue as reported by testpmd
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxQueueState {
    Stopped,
    Started,
    Hairpin,
    Unknown,
}

impl FromStr for RxQueueState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "stopped" => Ok(Self::Stopped),
            "started" => Ok(Self::Started),
            "hairpin" => Ok(Self::Hairpin),
            "unknown" => Ok(Self::Unknown),
            other => Err(Error::conversion(format!("unknown RX queue state '{}'", other))),
        }
    }
}

/// `show rxq info <port> <queue>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxqInfo {
    pub queue: QueueInfo,
    pub mempool: Option<String>,
    pub drop_packets: bool,
    pub scattered_packets: bool,
    pub queue_state: Option<RxQueueState>,
}

impl TextParser for RxqInfo {
    fn parse(output: &str) -> Result<Self> {
        let f = Fields::new::<Self>(output);
        Ok(Self {
            queue: QueueInfo::parse(output)?,
            mempool: f.optional("mempool", text(r"Mempool: ([^\r\n]+)"))?,
            drop_packets: f.required("drop_packets", flag("RX drop packets: on"))?,
            scattered_packets: f.required("scattered_packets", flag("RX scattered packets: on"))?,
            queue_state: f.optional(
                "queue_state",
                text(r"Rx queue state: ([^\r\n]+)").try_map(|s| s.parse::<RxQueueState>()),
            )?,
        })
    }
}

/// Device capability bits of `show port info`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCapabilities(pub u64);

impl DeviceCapabilities {
    pub const RUNTIME_RX_QUEUE_SETUP: Self = Self(1 << 0);
    pub const RUNTIME_TX_QUEUE_SETUP: Self = Self(1 << 1);
    pub const RXQ_SHARE: Self = Self(1 << 2);
    pub const FLOW_RULE_KEEP: Self = Self(1 << 3);
    pub const FLOW_SHARED_OBJECT_KEEP: Self = Self(1 << 4);

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// VLAN offload settings of a port
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VlanOffload {
    pub strip: bool,
    pub filter: bool,
    pub extend: bool,
    pub qinq_strip: bool,
}

impl VlanOffload {
    fn from_named(groups: HashMap<String, String>) -> Self {
        let on = |name: &str| groups.get(name).is_some_and(|v| v == "on");
        Self {
            strip: on("STRIP"),
            filter: on("FILTER"),
            extend: on("EXTEND"),
            qinq_strip: on("QINQ_STRIP"),
        }
    }
}

/// `show port info <port>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub id: u64,
    pub device_name: String,
    pub driver_name: String,
    pub socket_id: u64,
    pub is_link_up: bool,
    pub link_speed: String,
    pub is_link_full_duplex: bool,
    pub is_link_autonegotiated: bool,
    pub is_promiscuous_mode_enabled: bool,
    pub is_allmulticast_mode_enabled: bool,
    pub max_mac_addresses_num: u64,
    pub rx_queues_num: u64,
    pub max_rx_queues_num: u64,
    pub tx_queues_num: u64,
    pub max_tx_queues_num: u64,
    pub device_capabilities: DeviceCapabilities,
    pub device_error_handling_mode: Option<String>,
    pub mac_address: Option<String>,
    pub firmware_version: Option<String>,
    pub mtu: Option<u64>,
    pub vlan_offload: Option<VlanOffload>,
}

impl TextParser for PortInfo {
    fn parse(output: &str) -> Result<Self> {
        let f = Fields::new::<Self>(output);
        Ok(Self {
            id: f.required("id", find_int(r"Infos for port (\d+)\b"))?,
            device_name: f.required("device_name", text(r"Device name: ([^\r\n]+)"))?,
            driver_name: f.required("driver_name", text(r"Driver name: ([^\r\n]+)"))?,
            socket_id: f.required("socket_id", find_int(r"Connect to socket: (\d+)"))?,
            is_link_up: f.required("is_link_up", flag("Link status: up"))?,
            link_speed: f.required("link_speed", text(r"Link speed: ([^\r\n]+)"))?,
            is_link_full_duplex: f
                .required("is_link_full_duplex", flag("Link duplex: full-duplex"))?,
            is_link_autonegotiated: f
                .required("is_link_autonegotiated", flag("Autoneg status: On"))?,
            is_promiscuous_mode_enabled: f
                .required("is_promiscuous_mode_enabled", flag("Promiscuous mode: enabled"))?,
            is_allmulticast_mode_enabled: f
                .required("is_allmulticast_mode_enabled", flag("Allmulticast mode: enabled"))?,
            max_mac_addresses_num: f.required(
                "max_mac_addresses_num",
                find_int(r"Maximum number of MAC addresses: (\d+)"),
            )?,
            rx_queues_num: f
                .required("rx_queues_num", find_int(r"Current number of RX queues: (\d+)"))?,
            max_rx_queues_num: f
                .required("max_rx_queues_num", find_int(r"Max possible RX queues: (\d+)"))?,
            tx_queues_num: f
                .required("tx_queues_num", find_int(r"Current number of TX queues: (\d+)"))?,
            max_tx_queues_num: f
                .required("max_tx_queues_num", find_int(r"Max possible TX queues: (\d+)"))?,
            device_capabilities: f.required(
                "device_capabilities",
                find_int(r"Device capabilities: (0x[A-Fa-f\d]+)").map(DeviceCapabilities),
            )?,
            device_error_handling_mode: f.optional(
                "device_error_handling_mode",
                text(r"Device error handling mode: (\w+)"),
            )?,
            mac_address: f.optional("mac_address", text(r"MAC address: ([A-Fa-f0-9:]+)"))?,
            firmware_version: f
                .optional("firmware_version", text(r"Firmware-version: ([^\r\n]+)"))?,
            mtu: f.optional("mtu", find_int(r"MTU: (\d+)"))?,
            vlan_offload: f.optional(
                "vlan_offload",
                named(
                    r"VLAN offload:\s+strip (?P<STRIP>on|off), filter (?P<FILTER>on|off), extend (?P<EXTEND>on|off), qinq strip (?P<QINQ_STRIP>on|off)",
                )
                .map(VlanOffload::from_named),
            )?,
        })
    }
}

/// One packet of testpmd verbose output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerbosePacket {
    pub port_id: u64,
    pub queue_id: u64,
    pub was_received: bool,
    pub src_mac: String,
    pub dst_mac: String,
    pub pool: String,
    pub p_type: u64,
    pub length: u64,
    pub nb_segs: u64,
    pub hw_ptype: Vec<String>,
    pub sw_ptype: Vec<String>,
    pub l2_len: u64,
    pub ol_flags: Vec<String>,
    pub rss_hash: Option<u64>,
    pub rss_queue: Option<u64>,
    pub l3_len: Option<u64>,
    pub l4_len: Option<u64>,
    pub l4_dport: Option<u64>,
}

fn words(pattern: &str) -> impl Rule<Output = Vec<String>> + use<'_> {
    text(pattern).map(|s| s.split_whitespace().map(str::to_string).collect())
}

impl TextParser for VerbosePacket {
    fn parse(output: &str) -> Result<Self> {
        let f = Fields::new::<Self>(output);
        Ok(Self {
            port_id: f.required("port_id", find_int(r"port (\d+)/queue \d+"))?,
            queue_id: f.required("queue_id", find_int(r"port \d+/queue (\d+)"))?,
            was_received: f.required("was_received", flag(r"received \d+ packets"))?,
            src_mac: f.required("src_mac", text(&format!("src=({})", MAC_ADDRESS)))?,
            dst_mac: f.required("dst_mac", text(&format!("dst=({})", MAC_ADDRESS)))?,
            pool: f.required("pool", text(r"pool=(\S+)"))?,
            p_type: f.required("p_type", find_int(r"type=(0x[a-fA-F\d]+)"))?,
            length: f.required("length", find_int(r"length=(\d+)"))?,
            nb_segs: f.required("nb_segs", find_int(r"nb_segs=(\d+)"))?,
            hw_ptype: f.or_default("hw_ptype", words(r"hw ptype: ([^-]+)"))?,
            sw_ptype: f.or_default("sw_ptype", words(r"sw ptype: ([^-]+)"))?,
            l2_len: f.required("l2_len", find_int(r"l2_len=(\d+)"))?,
            ol_flags: f.or_default("ol_flags", words(r"ol_flags: ([^\n]+)"))?,
            rss_hash: f.optional("rss_hash", find_int(r"RSS hash=(0x[a-fA-F\d]+)"))?,
            rss_queue: f.optional("rss_queue", find_int(r"RSS queue=(0x[a-fA-F\d]+)"))?,
            l3_len: f.optional("l3_len", find_int(r"l3_len=(\d+)"))?,
            l4_len: f.optional("l4_len", find_int(r"l4_len=(\d+)"))?,
            l4_dport: f.optional("l4_dport", find_int(r"Destination (?:TCP|UDP) port=(\d+)"))?,
        })
    }
}

/// `show port <port> flow_ctrl`; every field has a default
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortFlowCtrl {
    pub rx: bool,
    pub tx: bool,
    pub high_water: u64,
    pub low_water: u64,
    pub pause_time: u64,
    pub send_xon: bool,
    pub mac_ctrl_frame_fwd: bool,
    pub autoneg: bool,
}

impl TextParser for PortFlowCtrl {
    fn parse(output: &str) -> Result<Self> {
        let f = Fields::new::<Self>(output);
        Ok(Self {
            rx: f.or_default("rx", flag("Rx pause: on"))?,
            tx: f.or_default("tx", flag("Tx pause: on"))?,
            high_water: f.or_default("high_water", find_int(r"High waterline: (0x[a-fA-F\d]+)"))?,
            low_water: f.or_default("low_water", find_int(r"Low waterline: (0x[a-fA-F\d]+)"))?,
            pause_time: f.or_default("pause_time", find_int(r"Pause time: (0x[a-fA-F\d]+)"))?,
            send_xon: f.or_default("send_xon", flag("Send XON: on"))?,
            mac_ctrl_frame_fwd: f
                .or_default("mac_ctrl_frame_fwd", flag("Forward MAC control frames: on"))?,
            autoneg: f.or_default("autoneg", flag("Autoneg: on"))?,
        })
    }
}

/// Arguments of `set flow_ctrl`
impl fmt::Display for PortFlowCtrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rx {} tx {} {} {} {} {} mac_ctrl_frame_fwd {} autoneg {}",
            on_off(self.rx),
            on_off(self.tx),
            self.high_water,
            self.low_water,
            self.pause_time,
            u8::from(self.send_xon),
            on_off(self.mac_ctrl_frame_fwd),
            on_off(self.autoneg)
        )
    }
}

fn regex(pattern: &str, multi_line: bool, dot_matches_new_line: bool) -> Result<regex::Regex> {
    RegexBuilder::new(pattern)
        .multi_line(multi_line)
        .dot_matches_new_line(dot_matches_new_line)
        .build()
        .map_err(|e| Error::invalid_pattern(pattern, e))
}

/// Split `show port info all` output into one block per port
pub fn split_port_info(output: &str) -> Result<Vec<String>> {
    let output = format!("{}\r\n", output);
    let re = regex(r"\*{21}.*?[\r\n]{4}", false, true)?;
    Ok(re
        .find_iter(&output)
        .map(|m| m.as_str().to_string())
        .collect())
}

/// Split `show port stats all` output into one block per port
pub fn split_port_stats(output: &str) -> Result<Vec<&str>> {
    let re = regex(r"(^  #*.+#*$[^#]+)^  #*\r$", true, false)?;
    Ok(re
        .captures_iter(output)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect())
}

/// Decode every packet in verbose output
///
/// A packet without its own `port X/queue Y` header line belongs to the last
/// header seen before it.
pub fn extract_verbose_output(output: &str) -> Result<Vec<VerbosePacket>> {
    let re = regex(
        r"(?P<HEADER>(?:port \d+/queue \d+: (?:received|sent) \d+ packets)?)\s*(?P<PACKET>src=[\w\s=:-]+?ol_flags: [\w ]+)",
        false,
        false,
    )?;

    let mut header = "";
    let mut packets = Vec::new();
    for caps in re.captures_iter(output) {
        if let Some(h) = caps.name("HEADER").filter(|h| !h.as_str().is_empty()) {
            header = h.as_str();
        }
        let packet = caps.name("PACKET").map_or("", |m| m.as_str());
        packets.push(VerbosePacket::parse(&format!("{}\n{}", header, packet))?);
    }
    Ok(packets)
}
