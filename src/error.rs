use thiserror::Error;

use crate::ofp_device::DeviceState;

/// Errors raised by the OpenFlow codec and the device session.
#[derive(Debug, Error)]
pub enum OfpError {
    /// Fewer than the 8 header bytes are buffered. Not fatal: read more and retry.
    #[error("incomplete header: {available} of 8 bytes available")]
    IncompleteHeader { available: usize },

    #[error("invalid packet length for {what}: {len} bytes")]
    InvalidPacketLength { what: &'static str, len: usize },

    #[error("unsupported OpenFlow version {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("missing required field: {0}")]
    MissingRequiredField(&'static str),

    #[error("version mismatch: expected {expected:#04x}, got {got:#04x}")]
    VersionMismatch { expected: u8, got: u8 },

    #[error("unexpected message type: expected {expected}, got {got}")]
    UnexpectedMessage { expected: u8, got: u8 },

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition { from: DeviceState, to: DeviceState },

    #[error("event consumer closed")]
    ConsumerClosed,

    /// The session behind a `DeviceHandle` has ended.
    #[error("device session closed")]
    SessionClosed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl OfpError {
    /// Shorthand for `InvalidPacketLength`.
    pub fn length(what: &'static str, len: usize) -> OfpError {
        OfpError::InvalidPacketLength { what, len }
    }

    /// True when the error only means "not enough bytes yet".
    pub fn is_retryable(&self) -> bool {
        matches!(self, OfpError::IncompleteHeader { .. })
    }
}

pub type Result<T> = std::result::Result<T, OfpError>;
