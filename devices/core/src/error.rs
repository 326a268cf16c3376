//! Error taxonomy shared by every protocol.

use std::io;

/// Raw transport failures, before they are attributed to a protocol stage
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// libusb failure
    #[error("usb error: {0}")]
    Usb(#[from] rusb::Error),

    /// hidapi failure
    #[error("hid error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// OS level failure (sg ioctl, sysfs)
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// No device matched the requested identity
    #[error("device not found")]
    NotFound,

    /// I/O attempted before `open()`
    #[error("transport is not open")]
    NotOpen,

    /// Fewer bytes moved than requested
    #[error("short transfer: expected {expected} bytes, moved {actual}")]
    ShortTransfer { expected: usize, actual: usize },

    /// The device did not answer within the timeout
    #[error("timed out")]
    Timeout,
}

impl TransportError {
    /// Whether the OS refused access to the device node
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Usb(rusb::Error::Access) => true,
            Self::Io(e) => e.kind() == io::ErrorKind::PermissionDenied,
            Self::Hid(hidapi::HidError::HidApiError { message }) => {
                message.to_lowercase().contains("permission denied")
            },
            _ => false,
        }
    }

    /// Whether the device stopped answering rather than failing outright
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout | Self::Usb(rusb::Error::Timeout))
    }

    /// Attribute this failure to a protocol stage.
    ///
    /// Access denials become [`DeviceError::PermissionDenied`], everything else is a
    /// [`DeviceError::Transport`].
    pub fn at(self, protocol: &'static str, stage: &'static str) -> DeviceError {
        if self.is_permission_denied() {
            DeviceError::PermissionDenied {
                protocol,
                stage,
                source: self,
            }
        } else {
            DeviceError::Transport {
                protocol,
                stage,
                source: self,
            }
        }
    }
}

/// Errors surfaced by discovery, handshakes and frame transfer
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The OS refused access to the device node
    #[error(
        "{protocol}: permission denied during {stage} ({source}); \
         install the udev rules or add your user to the device group"
    )]
    PermissionDenied {
        protocol: &'static str,
        stage: &'static str,
        #[source]
        source: TransportError,
    },

    /// Firmware still reported the boot sentinel after every poll
    #[error("{protocol}: device still booting after {attempts} polls")]
    DeviceNotReady { protocol: &'static str, attempts: u32 },

    /// Bad magic, bad echo, or no answer to the identification packet
    #[error("{protocol}: handshake failed: {reason}")]
    HandshakeFailed {
        protocol: &'static str,
        reason: String,
    },

    /// I/O failure mid-transfer; partial frame state is unknown
    #[error("{protocol}: transport error during {stage}: {source}")]
    Transport {
        protocol: &'static str,
        stage: &'static str,
        #[source]
        source: TransportError,
    },

    /// VID:PID is not in the registry
    #[error("unknown device {vendor_id:04x}:{product_id:04x}")]
    UnknownDevice { vendor_id: u16, product_id: u16 },

    /// A descriptor reached a protocol that cannot drive it
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// The device family is known but this operation or variant is not
    #[error("{protocol}: unsupported: {what}")]
    Unsupported {
        protocol: &'static str,
        what: String,
    },

    /// `send_frame` called before a successful handshake
    #[error("{protocol}: handshake required before {stage}")]
    HandshakeRequired {
        protocol: &'static str,
        stage: &'static str,
    },

    /// Pixel buffer does not match the panel
    #[error("invalid frame: expected {expected} bytes, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },
}

impl DeviceError {
    /// Shorthand for a [`DeviceError::HandshakeFailed`]
    pub fn handshake(protocol: &'static str, reason: impl Into<String>) -> Self {
        Self::HandshakeFailed {
            protocol,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;
