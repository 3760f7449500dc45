use std::io::{BufRead, Cursor, Read};
use std::net::Ipv4Addr;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;

use crate::bits::{bytes_of_text, pad8, text_of_bytes};
use crate::error::{OfpError, Result};
use crate::ofp_header::{Envelope, OPENFLOW_0_04_VERSION};
use crate::ofp_message::{self, DeviceIdentity, FlowStats, FlowStatsBody, Message, OfpMessage,
                         PortDesc, PortReason, SwitchDesc};
use crate::ofp_message::Match as _;
use crate::ofp_protocol::{supported_bitmap, Protocol};

/// OpenFlow 1.3 message type codes.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MsgCode {
    Hello,
    Error,
    EchoReq,
    EchoResp,
    Experimenter,
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
    GroupMod,
    PortMod,
    TableMod,
    MultipartReq,
    MultipartResp,
    BarrierReq,
    BarrierResp,
    QueueGetConfigReq,
    QueueGetConfigResp,
    RoleReq,
    RoleResp,
    GetAsyncReq,
    GetAsyncResp,
    SetAsync,
    MeterMod,
}

/// Multipart message types.
pub const OFPMP_DESC: u16 = 0;
pub const OFPMP_FLOW: u16 = 1;
pub const OFPMP_PORT_DESC: u16 = 13;

/// Multipart reply flag: more replies follow.
pub const OFPMPF_REPLY_MORE: u16 = 1;

/// Wildcard port and group for statistics requests.
pub const OFPP_ANY: u32 = 0xffff_ffff;
pub const OFPG_ANY: u32 = 0xffff_ffff;

/// Hello element carrying the version bitmap.
pub const OFPHET_VERSIONBITMAP: u16 = 1;

/// Match type of OXM matches.
pub const OFPMT_OXM: u16 = 1;
/// OXM class of the standard match fields.
pub const OFPXMC_OPENFLOW_BASIC: u16 = 0x8000;

/// VLAN id flag: a VLAN tag is present.
pub const OFPVID_PRESENT: u16 = 0x1000;

const MULTIPART_HEADER_SIZE: usize = 8;
const FEATURES_SIZE: usize = 24;
const PORT_SIZE: usize = 64;
const DESC_BODY_SIZE: usize = 1056;
const FLOW_STATS_REQUEST_SIZE: usize = 40;
const FLOW_STATS_FIXED_SIZE: usize = 48;
const PORT_STATUS_SIZE: usize = 8 + PORT_SIZE;
const MIN_MATCH_SIZE: usize = 8;

fn envelope(typ: MsgCode, xid: u32, payload: Vec<u8>) -> Result<Envelope> {
    Envelope::new(OPENFLOW_0_04_VERSION, typ as u8, xid, payload)
}

fn open(data: &[u8], typ: MsgCode) -> Result<Envelope> {
    Envelope::expect(data, OPENFLOW_0_04_VERSION, typ as u8)
}

fn multipart_header(bytes: &mut Vec<u8>, mp_type: u16, flags: u16) -> Result<()> {
    bytes.write_u16::<BigEndian>(mp_type)?;
    bytes.write_u16::<BigEndian>(flags)?;
    bytes.extend_from_slice(&[0; 4]);
    Ok(())
}

/// Check the multipart header of a payload and return its flags.
fn multipart_flags(payload: &[u8], mp_type: u16, what: &'static str) -> Result<u16> {
    if payload.len() < MULTIPART_HEADER_SIZE {
        return Err(OfpError::length(what, payload.len()));
    }
    let mut bytes = Cursor::new(payload);
    let typ = bytes.read_u16::<BigEndian>()?;
    if typ != mp_type {
        return Err(OfpError::ProtocolViolation(format!(
            "{}: unexpected multipart type {}",
            what, typ
        )));
    }
    Ok(bytes.read_u16::<BigEndian>()?)
}

/// One OXM TLV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OxmField {
    pub class: u16,
    pub field: u8,
    pub value: Vec<u8>,
    pub mask: Option<Vec<u8>>,
}

impl OxmField {
    fn wire_len(&self) -> usize {
        4 + self.value.len() + self.mask.as_ref().map_or(0, |m| m.len())
    }
}

// OpenFlow basic OXM field codes.
pub const OXM_OF_IN_PORT: u8 = 0;
pub const OXM_OF_ETH_DST: u8 = 3;
pub const OXM_OF_ETH_SRC: u8 = 4;
pub const OXM_OF_ETH_TYPE: u8 = 5;
pub const OXM_OF_VLAN_VID: u8 = 6;
pub const OXM_OF_IP_PROTO: u8 = 10;
pub const OXM_OF_IPV4_SRC: u8 = 11;
pub const OXM_OF_IPV4_DST: u8 = 12;
pub const OXM_OF_TCP_SRC: u8 = 13;
pub const OXM_OF_TCP_DST: u8 = 14;
pub const OXM_OF_UDP_SRC: u8 = 15;
pub const OXM_OF_UDP_DST: u8 = 16;

/// OXM match: an ordered list of TLVs. An empty list matches everything.
///
/// Fields this crate has no helper for are kept as raw TLVs and re-emitted unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Match {
    fields: Vec<OxmField>,
}

impl Match {
    pub fn new() -> Match {
        Match::default()
    }

    pub fn fields(&self) -> &[OxmField] {
        &self.fields
    }

    pub fn push(mut self, field: OxmField) -> Self {
        self.fields.push(field);
        self
    }

    fn basic(self, field: u8, value: &[u8], mask: Option<&[u8]>) -> Self {
        self.push(OxmField {
            class: OFPXMC_OPENFLOW_BASIC,
            field,
            value: value.to_vec(),
            mask: mask.map(|m| m.to_vec()),
        })
    }

    pub fn in_port(self, port: u32) -> Self {
        self.basic(OXM_OF_IN_PORT, &port.to_be_bytes(), None)
    }

    pub fn eth_dst(self, addr: [u8; 6]) -> Self {
        self.basic(OXM_OF_ETH_DST, &addr, None)
    }

    pub fn eth_src(self, addr: [u8; 6]) -> Self {
        self.basic(OXM_OF_ETH_SRC, &addr, None)
    }

    pub fn eth_type(self, typ: u16) -> Self {
        self.basic(OXM_OF_ETH_TYPE, &typ.to_be_bytes(), None)
    }

    /// Match a VLAN id; the "tag present" bit is added here.
    pub fn vlan_vid(self, vid: u16) -> Self {
        self.basic(OXM_OF_VLAN_VID, &(vid | OFPVID_PRESENT).to_be_bytes(), None)
    }

    pub fn ip_proto(self, proto: u8) -> Self {
        self.basic(OXM_OF_IP_PROTO, &[proto], None)
    }

    pub fn ipv4_src(self, addr: Ipv4Addr, mask: Option<Ipv4Addr>) -> Self {
        let mask = mask.map(|m| m.octets());
        self.basic(OXM_OF_IPV4_SRC, &addr.octets(), mask.as_ref().map(|m| &m[..]))
    }

    pub fn ipv4_dst(self, addr: Ipv4Addr, mask: Option<Ipv4Addr>) -> Self {
        let mask = mask.map(|m| m.octets());
        self.basic(OXM_OF_IPV4_DST, &addr.octets(), mask.as_ref().map(|m| &m[..]))
    }

    pub fn tcp_src(self, port: u16) -> Self {
        self.basic(OXM_OF_TCP_SRC, &port.to_be_bytes(), None)
    }

    pub fn tcp_dst(self, port: u16) -> Self {
        self.basic(OXM_OF_TCP_DST, &port.to_be_bytes(), None)
    }

    pub fn udp_src(self, port: u16) -> Self {
        self.basic(OXM_OF_UDP_SRC, &port.to_be_bytes(), None)
    }

    pub fn udp_dst(self, port: u16) -> Self {
        self.basic(OXM_OF_UDP_DST, &port.to_be_bytes(), None)
    }

    /// Padded wire size of the match at the front of `buf`, read from its length field.
    pub fn wire_len(buf: &[u8]) -> Result<usize> {
        if buf.len() < 4 {
            return Err(OfpError::length("match", buf.len()));
        }
        let len = usize::from(u16::from_be_bytes([buf[2], buf[3]]));
        if len < 4 {
            return Err(OfpError::length("match", len));
        }
        Ok(pad8(len))
    }
}

impl ofp_message::Match for Match {
    fn marshal_binary(&self) -> Result<Vec<u8>> {
        let len = 4 + self.fields.iter().map(OxmField::wire_len).sum::<usize>();
        if len > usize::from(u16::MAX) {
            return Err(OfpError::length("match", len));
        }
        let mut bytes = Vec::with_capacity(pad8(len));
        bytes.write_u16::<BigEndian>(OFPMT_OXM)?;
        bytes.write_u16::<BigEndian>(len as u16)?;
        for f in &self.fields {
            let body = f.wire_len() - 4;
            if f.field > 0x7f || body > 0xff ||
               f.mask.as_ref().map_or(false, |m| m.len() != f.value.len()) {
                return Err(OfpError::ProtocolViolation(format!(
                    "malformed oxm field {}:{}",
                    f.class, f.field
                )));
            }
            bytes.write_u16::<BigEndian>(f.class)?;
            bytes.write_u8(f.field << 1 | f.mask.is_some() as u8)?;
            bytes.write_u8(body as u8)?;
            bytes.extend_from_slice(&f.value);
            if let Some(ref mask) = f.mask {
                bytes.extend_from_slice(mask);
            }
        }
        bytes.resize(pad8(len), 0);
        Ok(bytes)
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        let padded = Match::wire_len(data)?;
        if padded != data.len() {
            return Err(OfpError::length("match", data.len()));
        }
        let typ = u16::from_be_bytes([data[0], data[1]]);
        if typ != OFPMT_OXM {
            return Err(OfpError::ProtocolViolation(format!("unsupported match type {}", typ)));
        }
        let len = usize::from(u16::from_be_bytes([data[2], data[3]]));
        let mut bytes = Cursor::new(&data[4..len]);
        let mut fields = vec![];
        while (bytes.position() as usize) < len - 4 {
            if len - 4 - (bytes.position() as usize) < 4 {
                return Err(OfpError::length("oxm field", len));
            }
            let class = bytes.read_u16::<BigEndian>()?;
            let fm = bytes.read_u8()?;
            let body = usize::from(bytes.read_u8()?);
            let has_mask = fm & 1 == 1;
            if (bytes.position() as usize) + body > len - 4 || (has_mask && body % 2 != 0) {
                return Err(OfpError::length("oxm field", body));
            }
            let value_len = if has_mask { body / 2 } else { body };
            let mut value = vec![0; value_len];
            bytes.read_exact(&mut value)?;
            let mask = if has_mask {
                let mut mask = vec![0; value_len];
                bytes.read_exact(&mut mask)?;
                Some(mask)
            } else {
                None
            };
            fields.push(OxmField {
                class,
                field: fm >> 1,
                value,
                mask,
            });
        }
        self.fields = fields;
        Ok(())
    }
}

fn parse_port(bytes: &mut Cursor<&[u8]>) -> Result<PortDesc> {
    let port_no = bytes.read_u32::<BigEndian>()?;
    bytes.consume(4);
    let mut hw_addr = [0; 6];
    bytes.read_exact(&mut hw_addr)?;
    bytes.consume(2);
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
        curr_speed: bytes.read_u32::<BigEndian>()?,
        max_speed: bytes.read_u32::<BigEndian>()?,
    })
}

fn marshal_port(port: &PortDesc, bytes: &mut Vec<u8>) -> Result<()> {
    bytes.write_u32::<BigEndian>(port.port_no)?;
    bytes.extend_from_slice(&[0; 4]);
    bytes.extend_from_slice(&port.hw_addr);
    bytes.extend_from_slice(&[0; 2]);
    bytes_of_text(&port.name, 16, bytes);
    for v in &[port.config,
               port.state,
               port.curr,
               port.advertised,
               port.supported,
               port.peer,
               port.curr_speed,
               port.max_speed] {
        bytes.write_u32::<BigEndian>(*v)?;
    }
    Ok(())
}

/// Greeting, optionally advertising every version the sender speaks.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Hello {
    pub xid: u32,
    /// Bit `n` set means wire version `n` is supported.
    pub versions: Option<u32>,
}

impl Hello {
    /// A hello advertising all versions this controller supports.
    pub fn new(xid: u32) -> Hello {
        Hello {
            xid,
            versions: Some(supported_bitmap()),
        }
    }

    /// Find the version bitmap element in a hello payload, if any.
    ///
    /// Only the first bitmap word is kept; it covers wire versions 0 to 31.
    pub fn version_bitmap_of(payload: &[u8]) -> Result<Option<u32>> {
        let mut rest = payload;
        while rest.len() >= 4 {
            let typ = u16::from_be_bytes([rest[0], rest[1]]);
            let len = usize::from(u16::from_be_bytes([rest[2], rest[3]]));
            if len < 4 || len > rest.len() {
                return Err(OfpError::length("hello element", len));
            }
            if typ == OFPHET_VERSIONBITMAP {
                if len < 8 {
                    return Err(OfpError::length("hello version bitmap", len));
                }
                return Ok(Some(u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]])));
            }
            rest = &rest[pad8(len).min(rest.len())..];
        }
        Ok(None)
    }
}

impl OfpMessage for Hello {
    fn to_envelope(&self) -> Result<Envelope> {
        let mut bytes = vec![];
        if let Some(bitmap) = self.versions {
            bytes.write_u16::<BigEndian>(OFPHET_VERSIONBITMAP)?;
            bytes.write_u16::<BigEndian>(8)?;
            bytes.write_u32::<BigEndian>(bitmap)?;
        }
        envelope(MsgCode::Hello, self.xid, bytes)
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        let env = open(data, MsgCode::Hello)?;
        self.xid = env.xid();
        self.versions = Hello::version_bitmap_of(env.payload())?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EchoRequest {
    pub xid: u32,
    pub data: Bytes,
}

impl OfpMessage for EchoRequest {
    fn to_envelope(&self) -> Result<Envelope> {
        Envelope::new(OPENFLOW_0_04_VERSION, MsgCode::EchoReq as u8, self.xid, self.data.clone())
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
        Envelope::new(OPENFLOW_0_04_VERSION, MsgCode::EchoResp as u8, self.xid, self.data.clone())
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        let env = open(data, MsgCode::EchoResp)?;
        self.xid = env.xid();
        self.data = env.payload().clone();
        Ok(())
    }
}

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
        Ok(ErrorMessage {
            xid,
            typ: u16::from_be_bytes([payload[0], payload[1]]),
            code: u16::from_be_bytes([payload[2], payload[3]]),
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
        Ok(Envelope::empty(OPENFLOW_0_04_VERSION, MsgCode::FeaturesReq as u8, self.xid))
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        self.xid = open(data, MsgCode::FeaturesReq)?.xid();
        Ok(())
    }
}

/// Switch features. Ports are not part of the 1.3 reply; see `PortDescRequest`.
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
        if payload.len() != FEATURES_SIZE {
            return Err(OfpError::length("features reply", payload.len()));
        }
        let mut bytes = Cursor::new(payload);
        let datapath_id = bytes.read_u64::<BigEndian>()?;
        let num_buffers = bytes.read_u32::<BigEndian>()?;
        let num_tables = bytes.read_u8()?;
        let auxiliary_id = bytes.read_u8()?;
        bytes.consume(2);
        let capabilities = bytes.read_u32::<BigEndian>()?;
        Ok(FeaturesReply {
            xid,
            identity: DeviceIdentity {
                datapath_id,
                num_buffers,
                num_tables,
                capabilities,
                actions: 0,
                auxiliary_id,
                ports: vec![],
            },
        })
    }
}

impl OfpMessage for FeaturesReply {
    fn to_envelope(&self) -> Result<Envelope> {
        let id = &self.identity;
        if !id.ports.is_empty() {
            return Err(OfpError::ProtocolViolation(
                "OpenFlow 1.3 features reply carries no ports".into(),
            ));
        }
        let mut bytes = Vec::with_capacity(FEATURES_SIZE);
        bytes.write_u64::<BigEndian>(id.datapath_id)?;
        bytes.write_u32::<BigEndian>(id.num_buffers)?;
        bytes.write_u8(id.num_tables)?;
        bytes.write_u8(id.auxiliary_id)?;
        bytes.extend_from_slice(&[0; 2]);
        bytes.write_u32::<BigEndian>(id.capabilities)?;
        bytes.write_u32::<BigEndian>(0)?;
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
        let mut bytes = Vec::with_capacity(MULTIPART_HEADER_SIZE);
        multipart_header(&mut bytes, OFPMP_DESC, 0)?;
        envelope(MsgCode::MultipartReq, self.xid, bytes)
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        let env = open(data, MsgCode::MultipartReq)?;
        multipart_flags(env.payload(), OFPMP_DESC, "desc request")?;
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
        if payload.len() < MULTIPART_HEADER_SIZE + DESC_BODY_SIZE {
            return Err(OfpError::length("desc reply", payload.len()));
        }
        multipart_flags(payload, OFPMP_DESC, "desc reply")?;
        Ok(DescReply {
            xid,
            desc: SwitchDesc {
                manufacturer: text_of_bytes(&payload[8..264]),
                hardware: text_of_bytes(&payload[264..520]),
                software: text_of_bytes(&payload[520..776]),
                serial: text_of_bytes(&payload[776..808]),
                description: text_of_bytes(&payload[808..1064]),
            },
        })
    }
}

impl OfpMessage for DescReply {
    fn to_envelope(&self) -> Result<Envelope> {
        let mut bytes = Vec::with_capacity(MULTIPART_HEADER_SIZE + DESC_BODY_SIZE);
        multipart_header(&mut bytes, OFPMP_DESC, 0)?;
        bytes_of_text(&self.desc.manufacturer, 256, &mut bytes);
        bytes_of_text(&self.desc.hardware, 256, &mut bytes);
        bytes_of_text(&self.desc.software, 256, &mut bytes);
        bytes_of_text(&self.desc.serial, 32, &mut bytes);
        bytes_of_text(&self.desc.description, 256, &mut bytes);
        envelope(MsgCode::MultipartResp, self.xid, bytes)
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        let env = open(data, MsgCode::MultipartResp)?;
        *self = DescReply::parse(env.xid(), env.payload())?;
        Ok(())
    }
}

/// Individual flow statistics request.
///
/// Only `FlowStatsRequest::builder` creates one with caller-chosen fields, and it
/// refuses to do so without a match.
#[derive(Debug)]
pub struct FlowStatsRequest {
    xid: u32,
    table_id: u8,
    out_port: u32,
    out_group: u32,
    cookie: u64,
    cookie_mask: u64,
    match_fields: Box<dyn ofp_message::Match>,
}

impl Default for FlowStatsRequest {
    fn default() -> FlowStatsRequest {
        FlowStatsRequest {
            xid: 0,
            table_id: 0xff,
            out_port: OFPP_ANY,
            out_group: OFPG_ANY,
            cookie: 0,
            cookie_mask: 0,
            match_fields: Box::new(Match::new()),
        }
    }
}

impl FlowStatsRequest {
    pub fn builder(xid: u32) -> FlowStatsRequestBuilder {
        FlowStatsRequestBuilder {
            xid,
            table_id: 0xff,
            out_port: OFPP_ANY,
            out_group: OFPG_ANY,
            cookie: 0,
            cookie_mask: 0,
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

    pub fn out_port(&self) -> u32 {
        self.out_port
    }

    pub fn out_group(&self) -> u32 {
        self.out_group
    }

    pub fn cookie(&self) -> u64 {
        self.cookie
    }

    pub fn cookie_mask(&self) -> u64 {
        self.cookie_mask
    }

    pub fn match_fields(&self) -> &dyn ofp_message::Match {
        self.match_fields.as_ref()
    }
}

impl OfpMessage for FlowStatsRequest {
    fn to_envelope(&self) -> Result<Envelope> {
        let m = self.match_fields.marshal_binary()?;
        let mut bytes = Vec::with_capacity(FLOW_STATS_REQUEST_SIZE + m.len());
        multipart_header(&mut bytes, OFPMP_FLOW, 0)?;
        bytes.write_u8(self.table_id)?;
        bytes.extend_from_slice(&[0; 3]);
        bytes.write_u32::<BigEndian>(self.out_port)?;
        bytes.write_u32::<BigEndian>(self.out_group)?;
        bytes.extend_from_slice(&[0; 4]);
        bytes.write_u64::<BigEndian>(self.cookie)?;
        bytes.write_u64::<BigEndian>(self.cookie_mask)?;
        bytes.extend_from_slice(&m);
        envelope(MsgCode::MultipartReq, self.xid, bytes)
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        let env = open(data, MsgCode::MultipartReq)?;
        let payload = env.payload();
        if payload.len() < FLOW_STATS_REQUEST_SIZE + MIN_MATCH_SIZE {
            return Err(OfpError::length("flow stats request", payload.len()));
        }
        multipart_flags(payload, OFPMP_FLOW, "flow stats request")?;
        let mut m = Match::new();
        m.unmarshal_binary(&payload[FLOW_STATS_REQUEST_SIZE..])?;
        let mut bytes = Cursor::new(&payload[8..FLOW_STATS_REQUEST_SIZE]);
        self.xid = env.xid();
        self.table_id = bytes.read_u8()?;
        bytes.consume(3);
        self.out_port = bytes.read_u32::<BigEndian>()?;
        self.out_group = bytes.read_u32::<BigEndian>()?;
        bytes.consume(4);
        self.cookie = bytes.read_u64::<BigEndian>()?;
        self.cookie_mask = bytes.read_u64::<BigEndian>()?;
        self.match_fields = Box::new(m);
        Ok(())
    }
}

/// Collects the fields of a `FlowStatsRequest`; the match is mandatory.
#[derive(Debug)]
pub struct FlowStatsRequestBuilder {
    xid: u32,
    table_id: u8,
    out_port: u32,
    out_group: u32,
    cookie: u64,
    cookie_mask: u64,
    match_fields: Option<Box<dyn ofp_message::Match>>,
}

impl FlowStatsRequestBuilder {
    pub fn table_id(mut self, id: u8) -> Self {
        self.table_id = id;
        self
    }

    pub fn out_port(mut self, port: u32) -> Self {
        self.out_port = port;
        self
    }

    pub fn out_group(mut self, group: u32) -> Self {
        self.out_group = group;
        self
    }

    pub fn cookie(mut self, cookie: u64) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn cookie_mask(mut self, mask: u64) -> Self {
        self.cookie_mask = mask;
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
            out_group: self.out_group,
            cookie: self.cookie,
            cookie_mask: self.cookie_mask,
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
        let flags = multipart_flags(payload, OFPMP_FLOW, "flow stats reply")?;
        let mut entries = vec![];
        let mut rest = payload.slice(MULTIPART_HEADER_SIZE..);
        while !rest.is_empty() {
            if rest.len() < FLOW_STATS_FIXED_SIZE + MIN_MATCH_SIZE {
                return Err(OfpError::length("flow stats entry", rest.len()));
            }
            let len = usize::from(u16::from_be_bytes([rest[0], rest[1]]));
            if len < FLOW_STATS_FIXED_SIZE + MIN_MATCH_SIZE || len > rest.len() {
                return Err(OfpError::length("flow stats entry", len));
            }
            let match_len = Match::wire_len(&rest[FLOW_STATS_FIXED_SIZE..len])?;
            let match_end = FLOW_STATS_FIXED_SIZE + match_len;
            if match_end > len {
                return Err(OfpError::length("flow stats match", match_len));
            }
            let mut m = Match::new();
            m.unmarshal_binary(&rest[FLOW_STATS_FIXED_SIZE..match_end])?;

            let mut bytes = Cursor::new(&rest[2..FLOW_STATS_FIXED_SIZE]);
            let table_id = bytes.read_u8()?;
            bytes.consume(1);
            let duration_sec = bytes.read_u32::<BigEndian>()?;
            let duration_nsec = bytes.read_u32::<BigEndian>()?;
            let priority = bytes.read_u16::<BigEndian>()?;
            let idle_timeout = bytes.read_u16::<BigEndian>()?;
            let hard_timeout = bytes.read_u16::<BigEndian>()?;
            let flags = bytes.read_u16::<BigEndian>()?;
            bytes.consume(4);
            entries.push(FlowStats {
                table_id,
                duration_sec,
                duration_nsec,
                priority,
                idle_timeout,
                hard_timeout,
                flags,
                cookie: bytes.read_u64::<BigEndian>()?,
                packet_count: bytes.read_u64::<BigEndian>()?,
                byte_count: bytes.read_u64::<BigEndian>()?,
                match_fields: Box::new(m),
                instructions: rest.slice(match_end..len),
            });
            rest = rest.slice(len..);
        }
        Ok(FlowStatsReply {
            xid,
            body: FlowStatsBody {
                more: flags & OFPMPF_REPLY_MORE != 0,
                entries,
            },
        })
    }
}

impl OfpMessage for FlowStatsReply {
    fn to_envelope(&self) -> Result<Envelope> {
        let mut bytes = vec![];
        let flags = if self.body.more { OFPMPF_REPLY_MORE } else { 0 };
        multipart_header(&mut bytes, OFPMP_FLOW, flags)?;
        for fs in &self.body.entries {
            let m = fs.match_fields.marshal_binary()?;
            let len = FLOW_STATS_FIXED_SIZE + m.len() + fs.instructions.len();
            if len > usize::from(u16::MAX) {
                return Err(OfpError::length("flow stats entry", len));
            }
            bytes.write_u16::<BigEndian>(len as u16)?;
            bytes.write_u8(fs.table_id)?;
            bytes.write_u8(0)?;
            bytes.write_u32::<BigEndian>(fs.duration_sec)?;
            bytes.write_u32::<BigEndian>(fs.duration_nsec)?;
            bytes.write_u16::<BigEndian>(fs.priority)?;
            bytes.write_u16::<BigEndian>(fs.idle_timeout)?;
            bytes.write_u16::<BigEndian>(fs.hard_timeout)?;
            bytes.write_u16::<BigEndian>(fs.flags)?;
            bytes.extend_from_slice(&[0; 4]);
            bytes.write_u64::<BigEndian>(fs.cookie)?;
            bytes.write_u64::<BigEndian>(fs.packet_count)?;
            bytes.write_u64::<BigEndian>(fs.byte_count)?;
            bytes.extend_from_slice(&m);
            bytes.extend_from_slice(&fs.instructions);
        }
        envelope(MsgCode::MultipartResp, self.xid, bytes)
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        let env = open(data, MsgCode::MultipartResp)?;
        *self = FlowStatsReply::parse(env.xid(), env.payload())?;
        Ok(())
    }
}

/// Ask for the description of every port.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PortDescRequest {
    pub xid: u32,
}

impl PortDescRequest {
    pub fn new(xid: u32) -> PortDescRequest {
        PortDescRequest { xid }
    }
}

impl OfpMessage for PortDescRequest {
    fn to_envelope(&self) -> Result<Envelope> {
        let mut bytes = Vec::with_capacity(MULTIPART_HEADER_SIZE);
        multipart_header(&mut bytes, OFPMP_PORT_DESC, 0)?;
        envelope(MsgCode::MultipartReq, self.xid, bytes)
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        let env = open(data, MsgCode::MultipartReq)?;
        multipart_flags(env.payload(), OFPMP_PORT_DESC, "port desc request")?;
        self.xid = env.xid();
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PortDescReply {
    pub xid: u32,
    pub ports: Vec<PortDesc>,
}

impl PortDescReply {
    fn parse(xid: u32, payload: &[u8]) -> Result<PortDescReply> {
        if payload.len() < MULTIPART_HEADER_SIZE ||
           (payload.len() - MULTIPART_HEADER_SIZE) % PORT_SIZE != 0 {
            return Err(OfpError::length("port desc reply", payload.len()));
        }
        multipart_flags(payload, OFPMP_PORT_DESC, "port desc reply")?;
        let num_ports = (payload.len() - MULTIPART_HEADER_SIZE) / PORT_SIZE;
        let mut bytes = Cursor::new(&payload[MULTIPART_HEADER_SIZE..]);
        let mut ports = Vec::with_capacity(num_ports);
        for _ in 0..num_ports {
            ports.push(parse_port(&mut bytes)?);
        }
        Ok(PortDescReply { xid, ports })
    }
}

impl OfpMessage for PortDescReply {
    fn to_envelope(&self) -> Result<Envelope> {
        let mut bytes = Vec::with_capacity(MULTIPART_HEADER_SIZE + PORT_SIZE * self.ports.len());
        multipart_header(&mut bytes, OFPMP_PORT_DESC, 0)?;
        for port in &self.ports {
            marshal_port(port, &mut bytes)?;
        }
        envelope(MsgCode::MultipartResp, self.xid, bytes)
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        let env = open(data, MsgCode::MultipartResp)?;
        *self = PortDescReply::parse(env.xid(), env.payload())?;
        Ok(())
    }
}

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
        Ok(Envelope::empty(OPENFLOW_0_04_VERSION, MsgCode::BarrierReq as u8, self.xid))
    }

    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<()> {
        self.xid = open(data, MsgCode::BarrierReq)?.xid();
        Ok(())
    }
}

/// Adapter for OpenFlow 1.3 (wire version 0x04).
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenFlow0x04;

impl Protocol for OpenFlow0x04 {
    fn version(&self) -> u8 {
        OPENFLOW_0_04_VERSION
    }

    fn name(&self) -> &'static str {
        "OpenFlow 1.3"
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
        if env.version() != OPENFLOW_0_04_VERSION {
            return Err(OfpError::VersionMismatch {
                expected: OPENFLOW_0_04_VERSION,
                got: env.version(),
            });
        }
        let xid = env.xid();
        let payload = env.payload();
        let msg = match env.type_code() {
            t if t == MsgCode::Hello as u8 => {
                Hello::version_bitmap_of(payload)?;
                Message::Hello
            }
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
            t if t == MsgCode::MultipartResp as u8 => {
                if payload.len() < MULTIPART_HEADER_SIZE {
                    return Err(OfpError::length("multipart reply", payload.len()));
                }
                match u16::from_be_bytes([payload[0], payload[1]]) {
                    OFPMP_DESC => Message::DescReply(DescReply::parse(xid, payload)?.desc),
                    OFPMP_FLOW => Message::FlowStatsReply(FlowStatsReply::parse(xid, payload)?.body),
                    OFPMP_PORT_DESC => {
                        Message::PortDescReply(PortDescReply::parse(xid, payload)?.ports)
                    }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ofp_header::MAX_PAYLOAD_SIZE;
    use crate::ofp_message::Match as _;

    fn sample_port(no: u32) -> PortDesc {
        PortDesc {
            port_no: no,
            hw_addr: [0xaa, 0, 0, 0, 0, no as u8],
            name: format!("port{}", no),
            config: 1,
            state: 4,
            curr: 0x2000,
            advertised: 0,
            supported: 0x2820,
            peer: 0,
            curr_speed: 10_000_000,
            max_speed: 10_000_000,
        }
    }

    #[test]
    fn hello_carries_version_bitmap() {
        let wire = Hello::new(1).marshal_binary().unwrap();
        assert_eq!(wire, vec![0x04, 0, 0, 16, 0, 0, 0, 1, 0, 1, 0, 8, 0, 0, 0, 0x12]);
        let mut back = Hello::default();
        back.unmarshal_binary(&wire).unwrap();
        assert_eq!(back.versions, Some(0x12));
    }

    #[test]
    fn hello_elements_are_validated() {
        // unknown element, then bitmap
        let payload = [0, 9, 0, 4, 0, 0, 0, 0, 0, 1, 0, 8, 0, 0, 0, 0x10];
        assert_eq!(Hello::version_bitmap_of(&payload).unwrap(), Some(0x10));
        assert_eq!(Hello::version_bitmap_of(&[]).unwrap(), None);
        assert!(Hello::version_bitmap_of(&[0, 1, 0, 40, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn features_reply_layout() {
        let mut payload = vec![0u8; FEATURES_SIZE];
        payload[0..8].copy_from_slice(&7u64.to_be_bytes());
        payload[8..12].copy_from_slice(&0xffu32.to_be_bytes());
        payload[12] = 254;
        payload[13] = 1;
        payload[16..20].copy_from_slice(&0x4fu32.to_be_bytes());
        let reply = FeaturesReply::parse(1, &payload).unwrap();
        let id = reply.identity();
        assert_eq!(id.datapath_id, 7);
        assert_eq!(id.num_buffers, 0xff);
        assert_eq!(id.num_tables, 254);
        assert_eq!(id.auxiliary_id, 1);
        assert_eq!(id.capabilities, 0x4f);
        assert_eq!(id.actions, 0);
        assert!(id.ports.is_empty());

        for len in (0..FEATURES_SIZE).chain(Some(FEATURES_SIZE + 64)) {
            assert!(matches!(
                FeaturesReply::parse(1, &vec![0; len]),
                Err(OfpError::InvalidPacketLength { .. })
            ));
        }
    }

    #[test]
    fn features_reply_round_trip() {
        let identity = DeviceIdentity {
            datapath_id: u64::MAX,
            num_buffers: 0,
            num_tables: 1,
            capabilities: 0x10f,
            actions: 0,
            auxiliary_id: 3,
            ports: vec![],
        };
        let wire = FeaturesReply::new(9, identity.clone()).marshal_binary().unwrap();
        let mut back = FeaturesReply::default();
        back.unmarshal_binary(&wire).unwrap();
        assert_eq!(back.identity, identity);
    }

    #[test]
    fn desc_reply_trims_acme() {
        let mut payload = vec![0u8; MULTIPART_HEADER_SIZE + DESC_BODY_SIZE];
        payload[8..12].copy_from_slice(b"ACME");
        payload[776..779].copy_from_slice(b"123");
        let reply = DescReply::parse(1, &payload).unwrap();
        assert_eq!(reply.desc.manufacturer, "ACME");
        assert_eq!(reply.desc.serial, "123");
        assert_eq!(reply.desc.hardware, "");

        payload.pop();
        assert!(matches!(
            DescReply::parse(1, &payload),
            Err(OfpError::InvalidPacketLength { .. })
        ));
    }

    #[test]
    fn desc_reply_round_trip_with_full_fields() {
        let desc = SwitchDesc {
            manufacturer: "m".repeat(256),
            hardware: "h".repeat(256),
            software: "s".repeat(256),
            serial: "0".repeat(32),
            description: "d".repeat(256),
        };
        let wire = DescReply { xid: 2, desc: desc.clone() }.marshal_binary().unwrap();
        let mut back = DescReply::default();
        back.unmarshal_binary(&wire).unwrap();
        assert_eq!(back.desc, desc);
    }

    #[test]
    fn desc_request_layout() {
        let wire = DescRequest::new(3).marshal_binary().unwrap();
        assert_eq!(wire, vec![0x04, 18, 0, 16, 0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn flow_stats_request_without_match_never_marshals() {
        let built = FlowStatsRequest::builder(1).cookie(5).cookie_mask(0xff).build();
        assert!(matches!(built, Err(OfpError::MissingRequiredField("match"))));
    }

    #[test]
    fn flow_stats_request_layout() {
        let m = Match::new().in_port(2).eth_type(0x0800);
        let req = FlowStatsRequest::builder(0x55)
            .table_id(0xff)
            .cookie(0x0102030405060708)
            .cookie_mask(u64::MAX)
            .match_fields(m.clone())
            .build()
            .unwrap();
        let wire = req.marshal_binary().unwrap();
        let payload = &wire[8..];
        assert_eq!(&payload[0..2], &OFPMP_FLOW.to_be_bytes());
        assert_eq!(payload[8], 0xff);
        assert_eq!(&payload[12..16], &OFPP_ANY.to_be_bytes());
        assert_eq!(&payload[16..20], &OFPG_ANY.to_be_bytes());
        assert_eq!(&payload[24..32], &0x0102030405060708u64.to_be_bytes());
        assert_eq!(&payload[32..40], &u64::MAX.to_be_bytes());
        assert_eq!(&payload[40..], &m.marshal_binary().unwrap()[..]);

        let mut back = FlowStatsRequest::default();
        back.unmarshal_binary(&wire).unwrap();
        assert_eq!(back.xid(), 0x55);
        assert_eq!(back.cookie(), 0x0102030405060708);
        assert_eq!(back.cookie_mask(), u64::MAX);
        assert_eq!(back.out_port(), OFPP_ANY);
        assert_eq!(back.match_fields().marshal_binary().unwrap(), m.marshal_binary().unwrap());
    }

    #[test]
    fn oxm_match_encoding() {
        let empty = Match::new().marshal_binary().unwrap();
        assert_eq!(empty, vec![0, 1, 0, 4, 0, 0, 0, 0]);

        let m = Match::new().in_port(1);
        let wire = m.marshal_binary().unwrap();
        assert_eq!(wire, vec![0, 1, 0, 12, 0x80, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn oxm_match_round_trip() {
        let m = Match::new()
            .in_port(7)
            .eth_src([1, 2, 3, 4, 5, 6])
            .eth_type(0x0800)
            .vlan_vid(100)
            .ip_proto(6)
            .ipv4_dst(Ipv4Addr::new(10, 0, 0, 0), Some(Ipv4Addr::new(255, 0, 0, 0)))
            .tcp_dst(443)
            .push(OxmField {
                class: 0xffff,
                field: 1,
                value: vec![9; 8],
                mask: None,
            });
        let wire = m.marshal_binary().unwrap();
        assert_eq!(wire.len() % 8, 0);
        let mut back = Match::new();
        back.unmarshal_binary(&wire).unwrap();
        assert_eq!(back, m);
        assert_eq!(back.fields()[3].value, vec![0x10, 100]);
        assert!(back.fields()[5].mask.is_some());
    }

    #[test]
    fn oxm_match_rejects_overruns() {
        // field claims 8 bytes of body, only 4 present
        let wire = [0, 1, 0, 12, 0x80, 0, 0, 8, 0, 0, 0, 1, 0, 0, 0, 0];
        assert!(Match::new().unmarshal_binary(&wire).is_err());
        // wrong match type
        let wire = [0, 0, 0, 4, 0, 0, 0, 0];
        assert!(matches!(
            Match::new().unmarshal_binary(&wire),
            Err(OfpError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn flow_stats_reply_round_trip() {
        let reply = FlowStatsReply {
            xid: 11,
            body: FlowStatsBody {
                more: false,
                entries: vec![FlowStats {
                    table_id: 1,
                    duration_sec: 3,
                    duration_nsec: 4,
                    priority: 100,
                    idle_timeout: 60,
                    hard_timeout: 0,
                    flags: 1,
                    cookie: 77,
                    packet_count: 1,
                    byte_count: 64,
                    match_fields: Box::new(Match::new().udp_dst(53)),
                    instructions: Bytes::from_static(&[0, 4, 0, 8, 0, 0, 0, 0]),
                }],
            },
        };
        let wire = reply.marshal_binary().unwrap();
        let mut back = FlowStatsReply::default();
        back.unmarshal_binary(&wire).unwrap();
        assert!(!back.body.more);
        let fs = &back.body.entries[0];
        assert_eq!(fs.flags, 1);
        assert_eq!(fs.cookie, 77);
        assert_eq!(fs.match_fields.marshal_binary().unwrap(),
                   Match::new().udp_dst(53).marshal_binary().unwrap());
        assert_eq!(&fs.instructions[..], &[0, 4, 0, 8, 0, 0, 0, 0]);
    }

    #[test]
    fn port_desc_reply_counts_records() {
        let reply = PortDescReply {
            xid: 1,
            ports: vec![sample_port(1), sample_port(0xfffffffe)],
        };
        let wire = reply.marshal_binary().unwrap();
        assert_eq!(wire.len(), 8 + 8 + 2 * 64);
        let mut back = PortDescReply::default();
        back.unmarshal_binary(&wire).unwrap();
        assert_eq!(back, reply);

        let mut payload = wire[8..].to_vec();
        payload.push(0);
        assert!(PortDescReply::parse(1, &payload).is_err());
    }

    #[test]
    fn port_desc_reply_round_trip_at_max_ports() {
        let max_ports = (MAX_PAYLOAD_SIZE - MULTIPART_HEADER_SIZE) / PORT_SIZE;
        assert_eq!(max_ports, 1023);
        let reply = PortDescReply {
            xid: 9,
            ports: (1..=max_ports as u32).map(sample_port).collect(),
        };
        let wire = reply.marshal_binary().unwrap();
        assert_eq!(wire.len(), 8 + 8 + 1023 * 64);
        let mut back = PortDescReply::default();
        back.unmarshal_binary(&wire).unwrap();
        assert_eq!(back.ports.len(), 1023);
        assert_eq!(back, reply);

        let mut too_many = reply;
        too_many.ports.push(sample_port(1024));
        assert!(too_many.marshal_binary().is_err());
    }

    #[test]
    fn decode_multipart_dispatch() {
        let p = OpenFlow0x04;
        let env = PortDescReply {
            xid: 1,
            ports: vec![sample_port(3)],
        }
        .to_envelope()
        .unwrap();
        match p.decode(&env).unwrap() {
            Message::PortDescReply(ports) => assert_eq!(ports, vec![sample_port(3)]),
            m => panic!("unexpected {:?}", m),
        }

        let status = PortStatus {
            xid: 2,
            status: ofp_message::PortStatus {
                reason: PortReason::PortAdd,
                desc: sample_port(9),
            },
        };
        match p.decode(&status.to_envelope().unwrap()).unwrap() {
            Message::PortStatus(s) => assert_eq!(s.desc.curr_speed, 10_000_000),
            m => panic!("unexpected {:?}", m),
        }

        let env = envelope(MsgCode::MultipartResp, 1, vec![0, 1, 0, 0]).unwrap();
        assert!(p.decode(&env).is_err());
    }
}
