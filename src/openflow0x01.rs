use std::io::{BufRead, Cursor, Read};
use std::net::Ipv4Addr;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;

use crate::bits::{bytes_of_text, text_of_bytes};
use crate::error::{OfpError, Result};
use crate::ofp_header::{Envelope, OPENFLOW_0_01_VERSION};
use crate::ofp_message::{self, DeviceIdentity, FlowStats, FlowStatsBody, Message, OfpMessage,
                         PortDesc, PortReason, SwitchDesc};
use crate::ofp_protocol::Protocol;

/// OpenFlow 1.0 message type codes, used by headers to identify meaning of the rest of a message.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MsgCode {
    Hello,
    Error,
    EchoReq,
    EchoResp,
    Vendor,
    FeaturesReq,
    FeaturesResp,
    GetConfigReq,
    GetConfigResp,
    SetConfig,
    PacketIn,
    FlowRemoved,
    PortStatus,
    PacketOut,
    FlowMod,
    PortMod,
    StatsReq,
    StatsResp,
    BarrierReq,
    BarrierResp,
    QueueGetConfigReq,
    QueueGetConfigResp,
}

/// Statistics types carried in the stats request/reply header.
pub const OFPST_DESC: u16 = 0;
pub const OFPST_FLOW: u16 = 1;

/// Stats reply flag: more replies follow.
pub const OFPSF_REPLY_MORE: u16 = 1;

/// "No port" wildcard for the 16-bit port space.
pub const OFPP_NONE: u16 = 0xffff;

const STATS_HEADER_SIZE: usize = 4;
const FEATURES_FIXED_SIZE: usize = 24;
const PORT_SIZE: usize = 48;
const MATCH_SIZE: usize = 40;
const DESC_BODY_SIZE: usize = 1056;
const FLOW_STATS_FIXED_SIZE: usize = 88;
const PORT_STATUS_SIZE: usize = 8 + PORT_SIZE;

fn envelope(typ: MsgCode, xid: u32, payload: Vec<u8>) -> Result<Envelope> {
    Envelope::new(OPENFLOW_0_01_VERSION, typ as u8, xid, payload)
}

fn open(data: &[u8], typ: MsgCode) -> Result<Envelope> {
    Envelope::expect(data, OPENFLOW_0_01_VERSION, typ as u8)
}

/// Check the stats header of a request/reply payload and return its flags.
fn stats_header(payload: &[u8], stats_type: u16, what: &'static str) -> Result<u16> {
    if payload.len() < STATS_HEADER_SIZE {
        return Err(OfpError::length(what, payload.len()));
    }
    let mut bytes = Cursor::new(payload);
    let typ = bytes.read_u16::<BigEndian>()?;
    if typ != stats_type {
        return Err(OfpError::ProtocolViolation(format!(
            "{}: unexpected stats type {}",
            what, typ
        )));
    }
    Ok(bytes.read_u16::<BigEndian>()?)
}

// Wildcard bits of `ofp_match`.
const OFPFW_IN_PORT: u32 = 1 << 0;
const OFPFW_DL_VLAN: u32 = 1 << 1;
const OFPFW_DL_SRC: u32 = 1 << 2;
const OFPFW_DL_DST: u32 = 1 << 3;
const OFPFW_DL_TYPE: u32 = 1 << 4;
const OFPFW_NW_PROTO: u32 = 1 << 5;
const OFPFW_TP_SRC: u32 = 1 << 6;
const OFPFW_TP_DST: u32 = 1 << 7;
const OFPFW_NW_SRC_SHIFT: u32 = 8;
const OFPFW_NW_DST_SHIFT: u32 = 14;
const OFPFW_DL_VLAN_PCP: u32 = 1 << 20;
const OFPFW_NW_TOS: u32 = 1 << 21;

/// Fields to match against flows.
///
/// `None` wildcards a field. IPv4 addresses carry a prefix length; a prefix of 0 is
/// the same as a wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Match {
    pub in_port: Option<u16>,
    pub dl_src: Option<[u8; 6]>,
    pub dl_dst: Option<[u8; 6]>,
    pub dl_vlan: Option<u16>,
    pub dl_vlan_pcp: Option<u8>,
    pub dl_type: Option<u16>,
    pub nw_tos: Option<u8>,
    pub nw_proto: Option<u8>,
    pub nw_src: Option<(Ipv4Addr, u8)>,
    pub nw_dst: Option<(Ipv4Addr, u8)>,
    pub tp_src: Option<u16>,
    pub tp_dst: Option<u16>,
}

impl Match {
    /// A match that wildcards every field.
    pub fn match_all() -> Match {
        Match::default()
    }

    fn wildcards(&self) -> u32 {
        fn flag<T>(f: &Option<T>, bit: u32) -> u32 {
            if f.is_none() {
                bit
            } else {
                0
            }
        }
        fn ip_bits(f: &Option<(Ipv4Addr, u8)>, shift: u32) -> u32 {
            let ignored = match *f {
                Some((_, prefix)) => 32 - u32::from(prefix.min(32)),
                None => 32,
            };
            ignored << shift
        }
        flag(&self.in_port, OFPFW_IN_PORT) | flag(&self.dl_vlan, OFPFW_DL_VLAN) |
        flag(&self.dl_src, OFPFW_DL_SRC) | flag(&self.dl_dst, OFPFW_DL_DST) |
        flag(&self.dl_type, OFPFW_DL_TYPE) | flag(&self.nw_proto, OFPFW_NW_PROTO) |
        flag(&self.tp_src, OFPFW_TP_SRC) | flag(&self.tp_dst, OFPFW_TP_DST) |
        ip_bits(&self.nw_src, OFPFW_NW_SRC_SHIFT) |
        ip_bits(&self.nw_dst, OFPFW_NW_DST_SHIFT) |
        flag(&self.dl_vlan_pcp, OFPFW_DL_VLAN_PCP) | flag(&self.nw_tos, OFPFW_NW_TOS)
    }
}

impl ofp_message::Match for Match {
    fn marshal_binary(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(MATCH_SIZE);
        bytes.write_u32::<BigEndian>(self.wildcards())?;
        bytes.write_u16::<BigEndian>(self.in_port.unwrap_or(0))?;
        bytes.extend_from_slice(&self.dl_src.unwrap_or([0; 6]));
        bytes.extend_from_slice(&self.dl_dst.unwrap_or([0; 6]));
        bytes.write_u16::<BigEndian>(self.dl_vlan.unwrap_or(0))?;
        bytes.write_u8(self.dl_vlan_pcp.unwrap_or(0))?;
        bytes.write_u8(0)?;
        bytes.write_u16::<BigEndian>(self.dl_type.unwrap_or(0))?;
        bytes.write_u8(self.nw_tos.unwrap_or(0))?;
        bytes.write_u8(self.nw_proto.unwrap_or(0))?;
        bytes.write_u16::<BigEndian>(0)?;
        bytes.write_u32::<BigEndian>(self.nw_src.map_or(0, |(a, _)| a.into()))?;
        bytes.write_u32::<BigEndian>(self.nw_dst.map_or(0, |(a, _)| a.into()))?;
        bytes.write_u16::<BigEndian>(self.tp_src.unwrap_or(0))?;
        bytes.write_u16::<BigEndian>(self.tp_dst.unwrap_or(0))?;
        Ok(bytes)
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        if data.len() != MATCH_SIZE {
            return Err(OfpError::length("match", data.len()));
        }
        let mut bytes = Cursor::new(data);
        let w = bytes.read_u32::<BigEndian>()?;
        let set = |bit: u32| w & bit == 0;
        let in_port = bytes.read_u16::<BigEndian>()?;
        let mut dl_src = [0; 6];
        bytes.read_exact(&mut dl_src)?;
        let mut dl_dst = [0; 6];
        bytes.read_exact(&mut dl_dst)?;
        let dl_vlan = bytes.read_u16::<BigEndian>()?;
        let dl_vlan_pcp = bytes.read_u8()?;
        bytes.consume(1);
        let dl_type = bytes.read_u16::<BigEndian>()?;
        let nw_tos = bytes.read_u8()?;
        let nw_proto = bytes.read_u8()?;
        bytes.consume(2);
        let nw_src = bytes.read_u32::<BigEndian>()?;
        let nw_dst = bytes.read_u32::<BigEndian>()?;
        let tp_src = bytes.read_u16::<BigEndian>()?;
        let tp_dst = bytes.read_u16::<BigEndian>()?;

        let ip = |addr: u32, shift: u32| {
            let ignored = (w >> shift) & 0x3f;
            if ignored >= 32 {
                None
            } else {
                Some((Ipv4Addr::from(addr), (32 - ignored) as u8))
            }
        };
        *self = Match {
            in_port: Some(in_port).filter(|_| set(OFPFW_IN_PORT)),
            dl_src: Some(dl_src).filter(|_| set(OFPFW_DL_SRC)),
            dl_dst: Some(dl_dst).filter(|_| set(OFPFW_DL_DST)),
            dl_vlan: Some(dl_vlan).filter(|_| set(OFPFW_DL_VLAN)),
            dl_vlan_pcp: Some(dl_vlan_pcp).filter(|_| set(OFPFW_DL_VLAN_PCP)),
            dl_type: Some(dl_type).filter(|_| set(OFPFW_DL_TYPE)),
            nw_tos: Some(nw_tos).filter(|_| set(OFPFW_NW_TOS)),
            nw_proto: Some(nw_proto).filter(|_| set(OFPFW_NW_PROTO)),
            nw_src: ip(nw_src, OFPFW_NW_SRC_SHIFT),
            nw_dst: ip(nw_dst, OFPFW_NW_DST_SHIFT),
            tp_src: Some(tp_src).filter(|_| set(OFPFW_TP_SRC)),
            tp_dst: Some(tp_dst).filter(|_| set(OFPFW_TP_DST)),
        };
        Ok(())
    }
}

fn parse_port(bytes: &mut Cursor<&[u8]>) -> Result<PortDesc> {
    let port_no = u32::from(bytes.read_u16::<BigEndian>()?);
    let mut hw_addr = [0; 6];
    bytes.read_exact(&mut hw_addr)?;
    let mut name = [0; 16];
    bytes.read_exact(&mut name)?;
    Ok(PortDesc {
        port_no,
        hw_addr,
        name: text_of_bytes(&name),
        config: bytes.read_u32::<BigEndian>()?,
        state: bytes.read_u32::<BigEndian>()?,
        curr: bytes.read_u32::<BigEndian>()?,
        advertised: bytes.read_u32::<BigEndian>()?,
        supported: bytes.read_u32::<BigEndian>()?,
        peer: bytes.read_u32::<BigEndian>()?,
        curr_speed: 0,
        max_speed: 0,
    })
}

fn marshal_port(port: &PortDesc, bytes: &mut Vec<u8>) -> Result<()> {
    if port.port_no > u32::from(u16::MAX) {
        return Err(OfpError::ProtocolViolation(format!(
            "port number {} does not fit OpenFlow 1.0",
            port.port_no
        )));
    }
    bytes.write_u16::<BigEndian>(port.port_no as u16)?;
    bytes.extend_from_slice(&port.hw_addr);
    bytes_of_text(&port.name, 16, bytes);
    for v in &[port.config, port.state, port.curr, port.advertised, port.supported, port.peer] {
        bytes.write_u32::<BigEndian>(*v)?;
    }
    Ok(())
}

/// Greeting sent by both ends when a connection opens. No body in OpenFlow 1.0.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Hello {
    pub xid: u32,
}

impl Hello {
    pub fn new(xid: u32) -> Hello {
        Hello { xid }
    }
}

impl OfpMessage for Hello {
    fn to_envelope(&self) -> Result<Envelope> {
        Ok(Envelope::empty(OPENFLOW_0_01_VERSION, MsgCode::Hello as u8, self.xid))
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        self.xid = open(data, MsgCode::Hello)?.xid();
        Ok(())
    }
}

/// Keepalive probe; the peer answers with an `EchoReply` carrying the same data.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EchoRequest {
    pub xid: u32,
    pub data: Bytes,
}

impl OfpMessage for EchoRequest {
    fn to_envelope(&self) -> Result<Envelope> {
        Envelope::new(OPENFLOW_0_01_VERSION, MsgCode::EchoReq as u8, self.xid, self.data.clone())
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        let env = open(data, MsgCode::EchoReq)?;
        self.xid = env.xid();
        self.data = env.payload().clone();
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EchoReply {
    pub xid: u32,
    pub data: Bytes,
}

impl OfpMessage for EchoReply {
    fn to_envelope(&self) -> Result<Envelope> {
        Envelope::new(OPENFLOW_0_01_VERSION, MsgCode::EchoResp as u8, self.xid, self.data.clone())
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        let env = open(data, MsgCode::EchoResp)?;
        self.xid = env.xid();
        self.data = env.payload().clone();
        Ok(())
    }
}

/// Error report: type, code and (usually) the head of the offending message.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    pub xid: u32,
    pub typ: u16,
    pub code: u16,
    pub data: Bytes,
}

impl ErrorMessage {
    fn parse(xid: u32, payload: &Bytes) -> Result<ErrorMessage> {
        if payload.len() < 4 {
            return Err(OfpError::length("error", payload.len()));
        }
        let mut bytes = Cursor::new(&payload[..]);
        Ok(ErrorMessage {
            xid,
            typ: bytes.read_u16::<BigEndian>()?,
            code: bytes.read_u16::<BigEndian>()?,
            data: payload.slice(4..),
        })
    }
}

impl OfpMessage for ErrorMessage {
    fn to_envelope(&self) -> Result<Envelope> {
        let mut bytes = Vec::with_capacity(4 + self.data.len());
        bytes.write_u16::<BigEndian>(self.typ)?;
        bytes.write_u16::<BigEndian>(self.code)?;
        bytes.extend_from_slice(&self.data);
        envelope(MsgCode::Error, self.xid, bytes)
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        let env = open(data, MsgCode::Error)?;
        *self = ErrorMessage::parse(env.xid(), env.payload())?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FeaturesRequest {
    pub xid: u32,
}

impl FeaturesRequest {
    pub fn new(xid: u32) -> FeaturesRequest {
        FeaturesRequest { xid }
    }
}

impl OfpMessage for FeaturesRequest {
    fn to_envelope(&self) -> Result<Envelope> {
        Ok(Envelope::empty(OPENFLOW_0_01_VERSION, MsgCode::FeaturesReq as u8, self.xid))
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        self.xid = open(data, MsgCode::FeaturesReq)?.xid();
        Ok(())
    }
}

/// Switch features, including the physical ports of the datapath.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FeaturesReply {
    pub xid: u32,
    pub identity: DeviceIdentity,
}

impl FeaturesReply {
    pub fn new(xid: u32, identity: DeviceIdentity) -> FeaturesReply {
        FeaturesReply { xid, identity }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn parse(xid: u32, payload: &[u8]) -> Result<FeaturesReply> {
        if payload.len() < FEATURES_FIXED_SIZE ||
           (payload.len() - FEATURES_FIXED_SIZE) % PORT_SIZE != 0 {
            return Err(OfpError::length("features reply", payload.len()));
        }
        let mut bytes = Cursor::new(payload);
        let datapath_id = bytes.read_u64::<BigEndian>()?;
        let num_buffers = bytes.read_u32::<BigEndian>()?;
        let num_tables = bytes.read_u8()?;
        bytes.consume(3);
        let capabilities = bytes.read_u32::<BigEndian>()?;
        let actions = bytes.read_u32::<BigEndian>()?;
        let num_ports = (payload.len() - FEATURES_FIXED_SIZE) / PORT_SIZE;
        let mut ports = Vec::with_capacity(num_ports);
        for _ in 0..num_ports {
            ports.push(parse_port(&mut bytes)?);
        }
        Ok(FeaturesReply {
            xid,
            identity: DeviceIdentity {
                datapath_id,
                num_buffers,
                num_tables,
                capabilities,
                actions,
                auxiliary_id: 0,
                ports,
            },
        })
    }
}

impl OfpMessage for FeaturesReply {
    fn to_envelope(&self) -> Result<Envelope> {
        let id = &self.identity;
        let mut bytes = Vec::with_capacity(FEATURES_FIXED_SIZE + PORT_SIZE * id.ports.len());
        bytes.write_u64::<BigEndian>(id.datapath_id)?;
        bytes.write_u32::<BigEndian>(id.num_buffers)?;
        bytes.write_u8(id.num_tables)?;
        bytes.extend_from_slice(&[0; 3]);
        bytes.write_u32::<BigEndian>(id.capabilities)?;
        bytes.write_u32::<BigEndian>(id.actions)?;
        for port in &id.ports {
            marshal_port(port, &mut bytes)?;
        }
        envelope(MsgCode::FeaturesResp, self.xid, bytes)
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        let env = open(data, MsgCode::FeaturesResp)?;
        *self = FeaturesReply::parse(env.xid(), env.payload())?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DescRequest {
    pub xid: u32,
}

impl DescRequest {
    pub fn new(xid: u32) -> DescRequest {
        DescRequest { xid }
    }
}

impl OfpMessage for DescRequest {
    fn to_envelope(&self) -> Result<Envelope> {
        let mut bytes = Vec::with_capacity(STATS_HEADER_SIZE);
        bytes.write_u16::<BigEndian>(OFPST_DESC)?;
        bytes.write_u16::<BigEndian>(0)?;
        envelope(MsgCode::StatsReq, self.xid, bytes)
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        let env = open(data, MsgCode::StatsReq)?;
        stats_header(env.payload(), OFPST_DESC, "desc request")?;
        self.xid = env.xid();
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DescReply {
    pub xid: u32,
    pub desc: SwitchDesc,
}

impl DescReply {
    fn parse(xid: u32, payload: &[u8]) -> Result<DescReply> {
        if payload.len() < STATS_HEADER_SIZE + DESC_BODY_SIZE {
            return Err(OfpError::length("desc reply", payload.len()));
        }
        stats_header(payload, OFPST_DESC, "desc reply")?;
        Ok(DescReply {
            xid,
            desc: SwitchDesc {
                manufacturer: text_of_bytes(&payload[4..260]),
                hardware: text_of_bytes(&payload[260..516]),
                software: text_of_bytes(&payload[516..772]),
                serial: text_of_bytes(&payload[772..804]),
                description: text_of_bytes(&payload[804..1060]),
            },
        })
    }
}

impl OfpMessage for DescReply {
    fn to_envelope(&self) -> Result<Envelope> {
        let mut bytes = Vec::with_capacity(STATS_HEADER_SIZE + DESC_BODY_SIZE);
        bytes.write_u16::<BigEndian>(OFPST_DESC)?;
        bytes.write_u16::<BigEndian>(0)?;
        bytes_of_text(&self.desc.manufacturer, 256, &mut bytes);
        bytes_of_text(&self.desc.hardware, 256, &mut bytes);
        bytes_of_text(&self.desc.software, 256, &mut bytes);
        bytes_of_text(&self.desc.serial, 32, &mut bytes);
        bytes_of_text(&self.desc.description, 256, &mut bytes);
        envelope(MsgCode::StatsResp, self.xid, bytes)
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        let env = open(data, MsgCode::StatsResp)?;
        *self = DescReply::parse(env.xid(), env.payload())?;
        Ok(())
    }
}

/// Individual flow statistics request.
///
/// Built through `FlowStatsRequest::builder`, which refuses to yield a request
/// without a match.
#[derive(Debug)]
pub struct FlowStatsRequest {
    xid: u32,
    table_id: u8,
    out_port: u16,
    match_fields: Box<dyn ofp_message::Match>,
}

impl Default for FlowStatsRequest {
    fn default() -> FlowStatsRequest {
        FlowStatsRequest {
            xid: 0,
            table_id: 0xff,
            out_port: OFPP_NONE,
            match_fields: Box::new(Match::match_all()),
        }
    }
}

impl FlowStatsRequest {
    pub fn builder(xid: u32) -> FlowStatsRequestBuilder {
        FlowStatsRequestBuilder {
            xid,
            table_id: 0xff,
            out_port: OFPP_NONE,
            match_fields: None,
        }
    }

    pub fn xid(&self) -> u32 {
        self.xid
    }

    /// 0xff means all tables.
    pub fn table_id(&self) -> u8 {
        self.table_id
    }

    pub fn out_port(&self) -> u16 {
        self.out_port
    }

    pub fn match_fields(&self) -> &dyn ofp_message::Match {
        self.match_fields.as_ref()
    }
}

impl OfpMessage for FlowStatsRequest {
    fn to_envelope(&self) -> Result<Envelope> {
        let m = self.match_fields.marshal_binary()?;
        if m.len() != MATCH_SIZE {
            return Err(OfpError::length("match", m.len()));
        }
        let mut bytes = Vec::with_capacity(STATS_HEADER_SIZE + MATCH_SIZE + 4);
        bytes.write_u16::<BigEndian>(OFPST_FLOW)?;
        bytes.write_u16::<BigEndian>(0)?;
        bytes.extend_from_slice(&m);
        bytes.write_u8(self.table_id)?;
        bytes.write_u8(0)?;
        bytes.write_u16::<BigEndian>(self.out_port)?;
        envelope(MsgCode::StatsReq, self.xid, bytes)
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        let env = open(data, MsgCode::StatsReq)?;
        let payload = env.payload();
        if payload.len() != STATS_HEADER_SIZE + MATCH_SIZE + 4 {
            return Err(OfpError::length("flow stats request", payload.len()));
        }
        stats_header(payload, OFPST_FLOW, "flow stats request")?;
        let mut m = Match::default();
        ofp_message::Match::unmarshal_binary(&mut m, &payload[4..44])?;
        let mut bytes = Cursor::new(&payload[44..]);
        self.xid = env.xid();
        self.table_id = bytes.read_u8()?;
        bytes.consume(1);
        self.out_port = bytes.read_u16::<BigEndian>()?;
        self.match_fields = Box::new(m);
        Ok(())
    }
}

/// Collects the fields of a `FlowStatsRequest`; the match is mandatory.
#[derive(Debug)]
pub struct FlowStatsRequestBuilder {
    xid: u32,
    table_id: u8,
    out_port: u16,
    match_fields: Option<Box<dyn ofp_message::Match>>,
}

impl FlowStatsRequestBuilder {
    pub fn table_id(mut self, id: u8) -> Self {
        self.table_id = id;
        self
    }

    pub fn out_port(mut self, port: u16) -> Self {
        self.out_port = port;
        self
    }

    pub fn match_fields(mut self, m: impl ofp_message::Match + 'static) -> Self {
        self.match_fields = Some(Box::new(m));
        self
    }

    pub fn build(self) -> Result<FlowStatsRequest> {
        let match_fields = self.match_fields.ok_or(OfpError::MissingRequiredField("match"))?;
        Ok(FlowStatsRequest {
            xid: self.xid,
            table_id: self.table_id,
            out_port: self.out_port,
            match_fields,
        })
    }
}

#[derive(Debug, Default)]
pub struct FlowStatsReply {
    pub xid: u32,
    pub body: FlowStatsBody,
}

impl FlowStatsReply {
    fn parse(xid: u32, payload: &Bytes) -> Result<FlowStatsReply> {
        let flags = stats_header(payload, OFPST_FLOW, "flow stats reply")?;
        let mut entries = vec![];
        let mut rest = payload.slice(STATS_HEADER_SIZE..);
        while !rest.is_empty() {
            if rest.len() < FLOW_STATS_FIXED_SIZE {
                return Err(OfpError::length("flow stats entry", rest.len()));
            }
            let len = usize::from(u16::from_be_bytes([rest[0], rest[1]]));
            if len < FLOW_STATS_FIXED_SIZE || len > rest.len() {
                return Err(OfpError::length("flow stats entry", len));
            }
            let mut bytes = Cursor::new(&rest[2..FLOW_STATS_FIXED_SIZE]);
            let table_id = bytes.read_u8()?;
            bytes.consume(1);
            let mut m = Match::default();
            ofp_message::Match::unmarshal_binary(&mut m, &rest[4..44])?;
            bytes.consume(MATCH_SIZE);
            let duration_sec = bytes.read_u32::<BigEndian>()?;
            let duration_nsec = bytes.read_u32::<BigEndian>()?;
            let priority = bytes.read_u16::<BigEndian>()?;
            let idle_timeout = bytes.read_u16::<BigEndian>()?;
            let hard_timeout = bytes.read_u16::<BigEndian>()?;
            bytes.consume(6);
            entries.push(FlowStats {
                table_id,
                duration_sec,
                duration_nsec,
                priority,
                idle_timeout,
                hard_timeout,
                flags: 0,
                cookie: bytes.read_u64::<BigEndian>()?,
                packet_count: bytes.read_u64::<BigEndian>()?,
                byte_count: bytes.read_u64::<BigEndian>()?,
                match_fields: Box::new(m),
                instructions: rest.slice(FLOW_STATS_FIXED_SIZE..len),
            });
            rest = rest.slice(len..);
        }
        Ok(FlowStatsReply {
            xid,
            body: FlowStatsBody {
                more: flags & OFPSF_REPLY_MORE != 0,
                entries,
            },
        })
    }
}

impl OfpMessage for FlowStatsReply {
    fn to_envelope(&self) -> Result<Envelope> {
        let mut bytes = vec![];
        bytes.write_u16::<BigEndian>(OFPST_FLOW)?;
        bytes.write_u16::<BigEndian>(if self.body.more { OFPSF_REPLY_MORE } else { 0 })?;
        for fs in &self.body.entries {
            let m = fs.match_fields.marshal_binary()?;
            if m.len() != MATCH_SIZE {
                return Err(OfpError::length("match", m.len()));
            }
            let len = FLOW_STATS_FIXED_SIZE + fs.instructions.len();
            if len > usize::from(u16::MAX) {
                return Err(OfpError::length("flow stats entry", len));
            }
            bytes.write_u16::<BigEndian>(len as u16)?;
            bytes.write_u8(fs.table_id)?;
            bytes.write_u8(0)?;
            bytes.extend_from_slice(&m);
            bytes.write_u32::<BigEndian>(fs.duration_sec)?;
            bytes.write_u32::<BigEndian>(fs.duration_nsec)?;
            bytes.write_u16::<BigEndian>(fs.priority)?;
            bytes.write_u16::<BigEndian>(fs.idle_timeout)?;
            bytes.write_u16::<BigEndian>(fs.hard_timeout)?;
            bytes.extend_from_slice(&[0; 6]);
            bytes.write_u64::<BigEndian>(fs.cookie)?;
            bytes.write_u64::<BigEndian>(fs.packet_count)?;
            bytes.write_u64::<BigEndian>(fs.byte_count)?;
            bytes.extend_from_slice(&fs.instructions);
        }
        envelope(MsgCode::StatsResp, self.xid, bytes)
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        let env = open(data, MsgCode::StatsResp)?;
        *self = FlowStatsReply::parse(env.xid(), env.payload())?;
        Ok(())
    }
}

/// A physical port has changed in the datapath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortStatus {
    pub xid: u32,
    pub status: ofp_message::PortStatus,
}

impl PortStatus {
    fn parse(xid: u32, payload: &[u8]) -> Result<PortStatus> {
        if payload.len() != PORT_STATUS_SIZE {
            return Err(OfpError::length("port status", payload.len()));
        }
        let mut bytes = Cursor::new(payload);
        let reason = PortReason::of_int(bytes.read_u8()?)?;
        bytes.consume(7);
        let desc = parse_port(&mut bytes)?;
        Ok(PortStatus {
            xid,
            status: ofp_message::PortStatus { reason, desc },
        })
    }
}

impl OfpMessage for PortStatus {
    fn to_envelope(&self) -> Result<Envelope> {
        let mut bytes = Vec::with_capacity(PORT_STATUS_SIZE);
        bytes.write_u8(self.status.reason.to_int())?;
        bytes.extend_from_slice(&[0; 7]);
        marshal_port(&self.status.desc, &mut bytes)?;
        envelope(MsgCode::PortStatus, self.xid, bytes)
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        let env = open(data, MsgCode::PortStatus)?;
        *self = PortStatus::parse(env.xid(), env.payload())?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BarrierRequest {
    pub xid: u32,
}

impl OfpMessage for BarrierRequest {
    fn to_envelope(&self) -> Result<Envelope> {
        Ok(Envelope::empty(OPENFLOW_0_01_VERSION, MsgCode::BarrierReq as u8, self.xid))
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        self.xid = open(data, MsgCode::BarrierReq)?.xid();
        Ok(())
    }
}

/// Adapter for OpenFlow 1.0 (wire version 0x01).
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenFlow0x01;

impl Protocol for OpenFlow0x01 {
    fn version(&self) -> u8 {
        OPENFLOW_0_01_VERSION
    }

    fn name(&self) -> &'static str {
        "OpenFlow 1.0"
    }

    fn hello(&self, xid: u32) -> Box<dyn OfpMessage> {
        Box::new(Hello::new(xid))
    }

    fn features_request(&self, xid: u32) -> Box<dyn OfpMessage> {
        Box::new(FeaturesRequest::new(xid))
    }

    fn echo_reply(&self, xid: u32, data: Bytes) -> Box<dyn OfpMessage> {
        Box::new(EchoReply { xid, data })
    }

    fn desc_request(&self, xid: u32) -> Box<dyn OfpMessage> {
        Box::new(DescRequest::new(xid))
    }

    fn decode(&self, env: &Envelope) -> Result<Message> {
        if env.version() != OPENFLOW_0_01_VERSION {
            return Err(OfpError::VersionMismatch {
                expected: OPENFLOW_0_01_VERSION,
                got: env.version(),
            });
        }
        let xid = env.xid();
        let payload = env.payload();
        let msg = match env.type_code() {
            t if t == MsgCode::Hello as u8 => Message::Hello,
            t if t == MsgCode::Error as u8 => {
                let e = ErrorMessage::parse(xid, payload)?;
                Message::Error(ofp_message::ErrorMsg {
                    typ: e.typ,
                    code: e.code,
                    data: e.data,
                })
            }
            t if t == MsgCode::EchoReq as u8 => Message::EchoRequest(payload.clone()),
            t if t == MsgCode::EchoResp as u8 => Message::EchoReply(payload.clone()),
            t if t == MsgCode::FeaturesResp as u8 => {
                Message::FeaturesReply(FeaturesReply::parse(xid, payload)?.identity)
            }
            t if t == MsgCode::StatsResp as u8 => {
                if payload.len() < STATS_HEADER_SIZE {
                    return Err(OfpError::length("stats reply", payload.len()));
                }
                match u16::from_be_bytes([payload[0], payload[1]]) {
                    OFPST_DESC => Message::DescReply(DescReply::parse(xid, payload)?.desc),
                    OFPST_FLOW => Message::FlowStatsReply(FlowStatsReply::parse(xid, payload)?.body),
                    _ => Message::Other {
                        typ: env.type_code(),
                        payload: payload.clone(),
                    },
                }
            }
            t if t == MsgCode::PortStatus as u8 => {
                Message::PortStatus(PortStatus::parse(xid, payload)?.status)
            }
            t if t == MsgCode::BarrierResp as u8 => Message::BarrierReply,
            typ => {
                Message::Other {
                    typ,
                    payload: payload.clone(),
                }
            }
        };
        Ok(msg)
    }
}
