use std::fmt;

use bytes::Bytes;

use crate::bits::test_bit;
use crate::error::{OfpError, Result};
use crate::ofp_header::Envelope;

/// OpenFlow Message
///
/// Version-agnostic API for handling OpenFlow messages at the byte-buffer level.
/// Every (version, kind) pair has its own implementing type in the adapter modules.
pub trait OfpMessage: fmt::Debug + Send {
    /// Build the envelope (header fields and encoded payload) for this message.
    fn to_envelope(&self) -> Result<Envelope>;

    /// Return a marshaled buffer containing an OpenFlow header and the message.
    fn marshal_binary(&self) -> Result<Vec<u8>> {
        Ok(self.to_envelope()?.marshal().to_vec())
    }

    /// Populate the message from one complete wire message, header included.
    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()>;
}

/// Flow match criteria.
///
/// The field set differs materially between protocol versions, so nothing outside
/// an adapter looks inside a match: it is only ever marshaled or unmarshaled.
pub trait Match: fmt::Debug + Send + Sync {
    fn marshal_binary(&self) -> Result<Vec<u8>>;
    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()>;
}

/// Capability bits shared by OpenFlow 1.0 and 1.3 features replies.
pub const CAP_FLOW_STATS: u32 = 0;
pub const CAP_TABLE_STATS: u32 = 1;
pub const CAP_PORT_STATS: u32 = 2;
pub const CAP_IP_REASM: u32 = 5;
pub const CAP_QUEUE_STATS: u32 = 6;

/// Description of a physical port.
///
/// Port numbers are widened to 32 bits; OpenFlow 1.0 ports never use the upper half
/// and carry no speed fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortDesc {
    pub port_no: u32,
    pub hw_addr: [u8; 6],
    pub name: String,
    pub config: u32,
    pub state: u32,
    pub curr: u32,
    pub advertised: u32,
    pub supported: u32,
    pub peer: u32,
    pub curr_speed: u32,
    pub max_speed: u32,
}

impl PortDesc {
    /// Port administratively down (`OFPPC_PORT_DOWN`).
    pub fn is_admin_down(&self) -> bool {
        test_bit(0, self.config)
    }

    /// No physical link present (`OFPPS_LINK_DOWN`).
    pub fn is_link_down(&self) -> bool {
        test_bit(0, self.state)
    }
}

/// Identity a switch reports in its features reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub datapath_id: u64,
    pub num_buffers: u32,
    pub num_tables: u8,
    pub capabilities: u32,
    /// Supported action bitmap. OpenFlow 1.0 only, zero otherwise.
    pub actions: u32,
    /// Auxiliary connection id. OpenFlow 1.3 only, zero otherwise.
    pub auxiliary_id: u8,
    pub ports: Vec<PortDesc>,
}

impl DeviceIdentity {
    pub fn has_capability(&self, bit: u32) -> bool {
        test_bit(bit, self.capabilities)
    }
}

/// Switch description strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchDesc {
    pub manufacturer: String,
    pub hardware: String,
    pub software: String,
    pub serial: String,
    pub description: String,
}

/// Statistics of one flow entry.
#[derive(Debug)]
pub struct FlowStats {
    pub table_id: u8,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    /// Flow-mod flags. Always zero for OpenFlow 1.0.
    pub flags: u16,
    pub cookie: u64,
    pub packet_count: u64,
    pub byte_count: u64,
    pub match_fields: Box<dyn Match>,
    /// Raw action list (1.0) or instruction list (1.3).
    pub instructions: Bytes,
}

/// Body of one flow statistics reply.
///
/// Large replies are split across several messages; `more` is set on all but the last.
#[derive(Debug, Default)]
pub struct FlowStatsBody {
    pub more: bool,
    pub entries: Vec<FlowStats>,
}

/// What changed about a physical port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortReason {
    PortAdd,
    PortDelete,
    PortModify,
}

impl PortReason {
    pub fn of_int(r: u8) -> Result<PortReason> {
        match r {
            0 => Ok(PortReason::PortAdd),
            1 => Ok(PortReason::PortDelete),
            2 => Ok(PortReason::PortModify),
            r => Err(OfpError::ProtocolViolation(format!("unknown port status reason {}", r))),
        }
    }

    pub fn to_int(self) -> u8 {
        self as u8
    }
}

/// A physical port has changed in the datapath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortStatus {
    pub reason: PortReason,
    pub desc: PortDesc,
}

/// Error reported by the switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMsg {
    pub typ: u16,
    pub code: u16,
    pub data: Bytes,
}

/// Decoded inbound message, independent of the negotiated version.
#[derive(Debug)]
pub enum Message {
    Hello,
    Error(ErrorMsg),
    EchoRequest(Bytes),
    EchoReply(Bytes),
    FeaturesReply(DeviceIdentity),
    DescReply(SwitchDesc),
    FlowStatsReply(FlowStatsBody),
    PortDescReply(Vec<PortDesc>),
    PortStatus(PortStatus),
    BarrierReply,
    /// A message type this core does not decode; passed through untouched.
    Other { typ: u8, payload: Bytes },
}

impl Message {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match *self {
            Message::Hello => "hello",
            Message::Error(_) => "error",
            Message::EchoRequest(_) => "echo_request",
            Message::EchoReply(_) => "echo_reply",
            Message::FeaturesReply(_) => "features_reply",
            Message::DescReply(_) => "desc_reply",
            Message::FlowStatsReply(_) => "flow_stats_reply",
            Message::PortDescReply(_) => "port_desc_reply",
            Message::PortStatus(_) => "port_status",
            Message::BarrierReply => "barrier_reply",
            Message::Other { .. } => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_flags() {
        let port = PortDesc {
            config: 1,
            state: 0,
            ..Default::default()
        };
        assert!(port.is_admin_down());
        assert!(!port.is_link_down());
    }

    #[test]
    fn capabilities() {
        let id = DeviceIdentity {
            capabilities: 0b0100_0111,
            ..Default::default()
        };
        assert!(id.has_capability(CAP_FLOW_STATS));
        assert!(id.has_capability(CAP_PORT_STATS));
        assert!(id.has_capability(CAP_QUEUE_STATS));
        assert!(!id.has_capability(CAP_IP_REASM));
    }

    #[test]
    fn port_reason_codes() {
        assert_eq!(PortReason::of_int(2).unwrap(), PortReason::PortModify);
        assert_eq!(PortReason::PortDelete.to_int(), 1);
        assert!(PortReason::of_int(9).is_err());
    }
}
