//! OpenFlow 1.0 / 1.3 wire codec and per-switch session core.

mod bits;
pub mod error;
pub mod ofp_codec;
pub mod ofp_controller;
pub mod ofp_device;
pub mod ofp_header;
pub mod ofp_message;
pub mod ofp_protocol;
pub mod openflow0x01;
pub mod openflow0x04;

pub use error::{OfpError, Result};
pub use ofp_controller::DeviceManager;
pub use ofp_device::{DeviceEvent, DeviceHandle, DeviceState, SessionConfig};
pub use ofp_message::{Message, OfpMessage};
