//! Device layer for Thermalright cooler LCD panels and LED controllers.
//!
//! [`discovery::discover`] lists supported devices, [`factory::create`] builds the protocol a
//! device speaks, and [`session::DeviceSession`] ties the two together with the probe cache
//! so one-shot LED handshakes survive process restarts.

pub mod config;
pub mod discovery;
pub mod factory;
pub mod media;
pub mod probe_cache;
pub mod registry;
pub mod session;

pub use trcc_core::{
    DeviceDescriptor, DeviceError, DeviceHandle, DeviceProtocol, HandshakeResult, ProtocolKind,
};
