//! Stream framing for OpenFlow connections.
//!
//! Wire format: 8-byte header whose 16-bit length field covers the whole message.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::OfpError;
use crate::ofp_header::{Envelope, OfpHeader, OFP_HEADER_SIZE};

/// Codec for framing `Envelope` values over a byte stream.
#[derive(Debug, Default)]
pub struct OfpCodec;

impl Decoder for OfpCodec {
    type Item = Envelope;
    type Error = OfpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let header = match OfpHeader::parse(src) {
            Ok(header) => header,
            Err(e) if e.is_retryable() => return Ok(None),
            Err(e) => return Err(e),
        };

        let length = header.length();
        if length < OFP_HEADER_SIZE {
            return Err(OfpError::length("header", length));
        }
        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let (envelope, consumed) = Envelope::parse(src)?;
        src.advance(consumed);
        Ok(Some(envelope))
    }
}

impl Encoder<Envelope> for OfpCodec {
    type Error = OfpError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.marshal_into(dst);
        Ok(())
    }
}
