//! Core traits and types for the trcc device layer.
//!
//! This crate provides:
//! - The `DeviceProtocol` trait that every wire protocol implements, with `as_*()` opt-in
//!   methods for capabilities only some devices have
//! - Device identity types (`DeviceDescriptor`, `ProtocolKind`, `HandshakeResult`)
//! - The static PM/FBL resolution tables and the RGB565 frame encoder
//! - USB transports (`rusb` bulk/interrupt, `hidapi` reports) behind the `Transport` trait

mod error;
pub mod frame;
pub mod handshake;
#[cfg(any(test, feature = "testutils"))]
pub mod mock;
mod protocol;
pub mod resolution;
pub mod timing;
pub mod transport;

pub use error::{DeviceError, Result, TransportError};
pub use protocol::{
    DeviceDescriptor, DeviceHandle, DeviceProtocol, Geometry, HandshakeResult, HasLeds,
    LedTopology, ProtocolKind, Rgb,
};
