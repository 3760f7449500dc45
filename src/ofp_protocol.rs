use std::fmt;

use bytes::Bytes;

use crate::error::{OfpError, Result};
use crate::ofp_header::{Envelope, OPENFLOW_0_01_VERSION, OPENFLOW_0_04_VERSION};
use crate::ofp_message::{Message, OfpMessage};
use crate::openflow0x01::OpenFlow0x01;
use crate::openflow0x04::{self, OpenFlow0x04};

/// Message type code of HELLO; identical in every OpenFlow version.
pub const OFPT_HELLO: u8 = 0;

/// Version Adapter
///
/// Everything the device session needs from one protocol version. Supporting a new
/// version means implementing this trait and registering it in `protocol_for`.
pub trait Protocol: Send + Sync {
    /// Wire version byte governed by this adapter.
    fn version(&self) -> u8;
    /// Human readable version name, for logs.
    fn name(&self) -> &'static str;

    fn hello(&self, xid: u32) -> Box<dyn OfpMessage>;
    fn features_request(&self, xid: u32) -> Box<dyn OfpMessage>;
    fn echo_reply(&self, xid: u32, data: Bytes) -> Box<dyn OfpMessage>;
    fn desc_request(&self, xid: u32) -> Box<dyn OfpMessage>;

    /// Fully decode one inbound envelope of this version.
    fn decode(&self, envelope: &Envelope) -> Result<Message>;
}

impl fmt::Debug for dyn Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

static OPENFLOW_0X01: OpenFlow0x01 = OpenFlow0x01;
static OPENFLOW_0X04: OpenFlow0x04 = OpenFlow0x04;

/// Versions this controller speaks, lowest first.
pub const SUPPORTED_VERSIONS: [u8; 2] = [OPENFLOW_0_01_VERSION, OPENFLOW_0_04_VERSION];

/// Return the adapter for the wire version `version`, if there is one.
pub fn protocol_for(version: u8) -> Option<&'static dyn Protocol> {
    match version {
        OPENFLOW_0_01_VERSION => Some(&OPENFLOW_0X01),
        OPENFLOW_0_04_VERSION => Some(&OPENFLOW_0X04),
        _ => None,
    }
}

/// Hello version bitmap advertising every supported version.
pub fn supported_bitmap() -> u32 {
    SUPPORTED_VERSIONS.iter().fold(0, |acc, v| acc | (1 << v))
}

/// Pick the adapter governing a session from the peer's HELLO.
///
/// A peer that advertises a version bitmap gets the highest version both sides list.
/// Without a bitmap the header version itself must be supported; there is no
/// implicit downgrade. Hello elements only exist from 1.3 on, so older hello
/// bodies are ignored.
pub fn negotiate(hello: &Envelope) -> Result<&'static dyn Protocol> {
    if hello.type_code() != OFPT_HELLO {
        return Err(OfpError::ProtocolViolation(format!(
            "expected hello, got message type {}",
            hello.type_code()
        )));
    }
    let bitmap = if hello.version() >= OPENFLOW_0_04_VERSION {
        openflow0x04::Hello::version_bitmap_of(hello.payload())?
    } else {
        None
    };
    match bitmap {
        Some(peer_bitmap) => {
            let common = peer_bitmap & supported_bitmap();
            if common == 0 {
                return Err(OfpError::UnsupportedVersion(hello.version()));
            }
            let best = (31 - common.leading_zeros()) as u8;
            protocol_for(best).ok_or(OfpError::UnsupportedVersion(best))
        }
        None => protocol_for(hello.version()).ok_or(OfpError::UnsupportedVersion(hello.version())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry() {
        assert_eq!(protocol_for(0x01).unwrap().version(), 0x01);
        assert_eq!(protocol_for(0x04).unwrap().name(), "OpenFlow 1.3");
        assert!(protocol_for(0x02).is_none());
        assert_eq!(supported_bitmap(), 0x12);
    }

    #[test]
    fn plain_hello_uses_header_version() {
        let hello = Envelope::empty(0x01, OFPT_HELLO, 1);
        assert_eq!(negotiate(&hello).unwrap().version(), 0x01);
        let hello = Envelope::empty(0x04, OFPT_HELLO, 1);
        assert_eq!(negotiate(&hello).unwrap().version(), 0x04);
    }

    #[test]
    fn openflow10_hello_body_is_not_parsed_as_elements() {
        let hello = Envelope::new(0x01, OFPT_HELLO, 1, vec![0xde, 0xad, 0xbe, 0xef]).unwrap();
        assert_eq!(negotiate(&hello).unwrap().version(), 0x01);
        // a well-formed bitmap element in a 1.0 hello is not honored either
        let payload = vec![0, 1, 0, 8, 0, 0, 0, 0x12];
        let hello = Envelope::new(0x01, OFPT_HELLO, 1, payload).unwrap();
        assert_eq!(negotiate(&hello).unwrap().version(), 0x01);
    }

    #[test]
    fn unsupported_plain_hello_is_rejected() {
        let hello = Envelope::empty(0x05, OFPT_HELLO, 1);
        assert!(matches!(negotiate(&hello), Err(OfpError::UnsupportedVersion(0x05))));
    }

    #[test]
    fn bitmap_picks_highest_common_version() {
        // peer speaks 1.0, 1.3 and 1.4
        let payload = vec![0, 1, 0, 8, 0, 0, 0, 0x32];
        let hello = Envelope::new(0x05, OFPT_HELLO, 1, payload).unwrap();
        assert_eq!(negotiate(&hello).unwrap().version(), 0x04);

        // peer speaks only 1.4 and 1.5
        let payload = vec![0, 1, 0, 8, 0, 0, 0, 0x60];
        let hello = Envelope::new(0x06, OFPT_HELLO, 1, payload).unwrap();
        assert!(matches!(negotiate(&hello), Err(OfpError::UnsupportedVersion(0x06))));
    }

    #[test]
    fn non_hello_is_a_violation() {
        let features = Envelope::empty(0x04, 5, 1);
        assert!(matches!(negotiate(&features), Err(OfpError::ProtocolViolation(_))));
    }
}
