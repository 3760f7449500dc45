use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};
use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{OfpError, Result};

/// Wire version byte of OpenFlow 1.0.
pub const OPENFLOW_0_01_VERSION: u8 = 0x01;
/// Wire version byte of OpenFlow 1.3.
pub const OPENFLOW_0_04_VERSION: u8 = 0x04;

/// Byte-size of an `OfpHeader`.
pub const OFP_HEADER_SIZE: usize = 8;

/// Largest payload that still fits the 16-bit length field.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize - OFP_HEADER_SIZE;

/// OpenFlow Header
///
/// The first fields of every OpenFlow message, no matter the protocol version.
/// This is parsed to determine version and length of the remaining message, so that
/// it can be properly handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfpHeader {
    version: u8,
    typ: u8,
    length: u16,
    xid: u32,
}

impl OfpHeader {
    /// Create an `OfpHeader` out of the arguments.
    pub fn new(version: u8, typ: u8, length: u16, xid: u32) -> OfpHeader {
        OfpHeader {
            version,
            typ,
            length,
            xid,
        }
    }

    /// Return the byte-size of an `OfpHeader`.
    pub fn size() -> usize {
        OFP_HEADER_SIZE
    }

    /// Read the header fields from the front of `buf`.
    ///
    /// Only the header itself is validated here; whether `buf` holds the whole
    /// message is up to the caller.
    pub fn parse(buf: &[u8]) -> Result<OfpHeader> {
        if buf.len() < OFP_HEADER_SIZE {
            return Err(OfpError::IncompleteHeader { available: buf.len() });
        }
        let mut bytes = Cursor::new(&buf[..OFP_HEADER_SIZE]);
        Ok(OfpHeader {
            version: bytes.read_u8()?,
            typ: bytes.read_u8()?,
            length: bytes.read_u16::<BigEndian>()?,
            xid: bytes.read_u32::<BigEndian>()?,
        })
    }

    /// Fills a message buffer with the header fields of an `OfpHeader`.
    pub fn marshal(&self, bytes: &mut BytesMut) {
        bytes.put_u8(self.version);
        bytes.put_u8(self.typ);
        bytes.put_u16(self.length);
        bytes.put_u32(self.xid);
    }

    /// Return the `version` field of a header.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Return the version-scoped message type code of a header.
    pub fn type_code(&self) -> u8 {
        self.typ
    }

    /// Return the `length` field of a header. Includes the length of the header itself.
    pub fn length(&self) -> usize {
        self.length as usize
    }

    /// Return the `xid` field of a header, the transaction id associated with this packet.
    ///  Replies use the same id to facilitate pairing.
    pub fn xid(&self) -> u32 {
        self.xid
    }
}

/// One complete OpenFlow message: header fields plus the undecoded payload.
///
/// The length is always derived from the payload, so an `Envelope` can never
/// disagree with the bytes it serializes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    version: u8,
    typ: u8,
    xid: u32,
    payload: Bytes,
}

impl Envelope {
    /// Build an envelope, failing if the payload would overflow the length field.
    pub fn new(version: u8, typ: u8, xid: u32, payload: impl Into<Bytes>) -> Result<Envelope> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(OfpError::length("envelope payload", payload.len()));
        }
        Ok(Envelope {
            version,
            typ,
            xid,
            payload,
        })
    }

    /// An envelope with no payload.
    pub fn empty(version: u8, typ: u8, xid: u32) -> Envelope {
        Envelope {
            version,
            typ,
            xid,
            payload: Bytes::new(),
        }
    }

    /// Extract one complete message from the front of `buf`.
    ///
    /// Returns the envelope and the number of bytes it occupied; anything after
    /// that belongs to the next message.
    pub fn parse(buf: &[u8]) -> Result<(Envelope, usize)> {
        let header = OfpHeader::parse(buf)?;
        let length = header.length();
        if length < OFP_HEADER_SIZE || length > buf.len() {
            return Err(OfpError::length("header", length));
        }
        let envelope = Envelope {
            version: header.version(),
            typ: header.type_code(),
            xid: header.xid(),
            payload: Bytes::copy_from_slice(&buf[OFP_HEADER_SIZE..length]),
        };
        Ok((envelope, length))
    }

    /// Like `parse`, but the whole of `data` must be exactly one message of the
    /// given version and type.
    pub fn expect(data: &[u8], version: u8, typ: u8) -> Result<Envelope> {
        let (envelope, consumed) = Envelope::parse(data)?;
        if consumed != data.len() {
            return Err(OfpError::length("message", data.len()));
        }
        envelope.check(version, typ)?;
        Ok(envelope)
    }

    /// Verify the version and type code of an already parsed envelope.
    pub fn check(&self, version: u8, typ: u8) -> Result<()> {
        if self.version != version {
            return Err(OfpError::VersionMismatch {
                expected: version,
                got: self.version,
            });
        }
        if self.typ != typ {
            return Err(OfpError::UnexpectedMessage {
                expected: typ,
                got: self.typ,
            });
        }
        Ok(())
    }

    pub fn header(&self) -> OfpHeader {
        OfpHeader::new(self.version, self.typ, self.length() as u16, self.xid)
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn type_code(&self) -> u8 {
        self.typ
    }

    pub fn xid(&self) -> u32 {
        self.xid
    }

    /// Total wire length, header included.
    pub fn length(&self) -> usize {
        OFP_HEADER_SIZE + self.payload.len()
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Append the wire form of this envelope to `dst`.
    pub fn marshal_into(&self, dst: &mut BytesMut) {
        dst.reserve(self.length());
        self.header().marshal(dst);
        dst.extend_from_slice(&self.payload);
    }

    /// Return the wire form of this envelope; always exactly `length()` bytes.
    pub fn marshal(&self) -> Bytes {
        let mut bytes = BytesMut::with_capacity(self.length());
        self.marshal_into(&mut bytes);
        bytes.freeze()
    }
}
