//! Device identity and the common protocol trait.

use std::ffi::CString;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::frame::FrameFormat;
use crate::Result;

/// One RGB triplet
pub type Rgb = [u8; 3];

/// Wire protocol family a device speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProtocolKind {
    /// SCSI generic pass-through LCD (USB mass storage class)
    Scsi,
    /// HID LCD with the `DA DB DC DD` handshake
    HidLcdType2,
    /// HID LCD with the `F5` SCSI-shaped packets
    HidLcdType3,
    /// HID RGB LED controller
    HidLed,
    /// Vendor specific USB bulk LCD
    Bulk,
}

impl ProtocolKind {
    pub const ALL: [ProtocolKind; 5] = [
        Self::Scsi,
        Self::HidLcdType2,
        Self::HidLcdType3,
        Self::HidLed,
        Self::Bulk,
    ];

    /// Short name used in logs and errors
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Scsi => "scsi",
            Self::HidLcdType2 => "hid-type2",
            Self::HidLcdType3 => "hid-type3",
            Self::HidLed => "hid-led",
            Self::Bulk => "bulk",
        }
    }

    /// Whether frames are pixels (as opposed to LED colours)
    pub const fn is_lcd(&self) -> bool {
        !matches!(self, Self::HidLed)
    }
}

impl FromStr for ProtocolKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| {
                format!("unknown protocol: {s}. Available: scsi, hid-type2, hid-type3, hid-led, bulk")
            })
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// OS level handle used to reach a device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceHandle {
    /// SCSI generic node, e.g. `/dev/sg2`
    ScsiNode(PathBuf),
    /// libusb bus number and device address
    Usb { bus: u8, address: u8 },
    /// hidapi device path
    Hid(CString),
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScsiNode(path) => write!(f, "{}", path.display()),
            Self::Usb { bus, address } => write!(f, "usb:{bus:03}:{address:03}"),
            Self::Hid(path) => write!(f, "hid:{}", path.to_string_lossy()),
        }
    }
}

/// One discovered physical peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Disambiguates identical VID:PID devices, e.g. `2-1.4`
    pub bus_path: Option<String>,
    pub handle: DeviceHandle,
    pub kind: ProtocolKind,
    /// 0-based position after sorting by bus path
    pub ordinal: usize,
    pub vendor: &'static str,
    pub product: &'static str,
}

impl DeviceDescriptor {
    pub fn vid_pid(&self) -> String {
        format!("{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// LED controller layout, derived from PM/SUB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LedTopology {
    /// Style id, 1..=13
    pub style_id: u8,
    /// Physical LEDs addressed on the wire
    pub led_count: usize,
    /// Logical segments the effect engine renders
    pub segment_count: usize,
    pub zone_count: usize,
}

/// What a handshake resolved the device into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Geometry {
    Panel { width: u32, height: u32 },
    Leds(LedTopology),
}

/// Outcome of a protocol handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResult {
    /// Product model byte
    pub pm: u8,
    /// Sub-type byte
    pub sub: u8,
    pub geometry: Geometry,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub valid: bool,
}

impl HandshakeResult {
    /// Valid LCD result with no serial or model name
    pub fn panel(pm: u8, sub: u8, (width, height): (u32, u32)) -> Self {
        Self {
            pm,
            sub,
            geometry: Geometry::Panel { width, height },
            model: None,
            serial: None,
            valid: true,
        }
    }

    /// Panel resolution, if this is an LCD
    pub fn resolution(&self) -> Option<(u32, u32)> {
        match self.geometry {
            Geometry::Panel { width, height } => Some((width, height)),
            Geometry::Leds(_) => None,
        }
    }

    /// LED layout, if this is an LED controller
    pub fn topology(&self) -> Option<&LedTopology> {
        match &self.geometry {
            Geometry::Leds(topology) => Some(topology),
            Geometry::Panel { .. } => None,
        }
    }
}

/// LED colour output capability
pub trait HasLeds {
    /// Send one set of logical segment colours at the given brightness (0..=100)
    fn send_colors(&mut self, colors: &[Rgb], brightness: u8) -> Result<()>;
    fn topology(&self) -> Option<LedTopology>;
}

/// Common capability set of every wire protocol.
///
/// Construction never touches the device; I/O happens in `handshake`, `send_frame`
/// and `clear`. Callers must not invoke methods concurrently on the same device.
pub trait DeviceProtocol: Send {
    fn kind(&self) -> ProtocolKind;

    /// Identify the device and prepare it for frames
    fn handshake(&mut self) -> Result<HandshakeResult>;

    /// Send one frame. LCDs take a payload in [`Self::frame_format`], LED controllers
    /// take logical RGB triplets.
    fn send_frame(&mut self, data: &[u8]) -> Result<()>;

    /// Release the device. Safe to call more than once.
    fn close(&mut self);

    /// Blank the output. Protocols without a native clear send an all-black frame.
    fn clear(&mut self) -> Result<()>;

    /// Payload format `send_frame` expects from LCD callers
    fn frame_format(&self) -> FrameFormat {
        FrameFormat::Rgb565
    }

    /// Adopt a previously cached handshake result without touching the device
    fn restore(&mut self, _result: &HandshakeResult) -> Result<()> {
        Err(crate::DeviceError::Unsupported {
            protocol: self.kind().name(),
            what: "restoring a cached handshake".into(),
        })
    }

    fn as_leds(&mut self) -> Option<&mut dyn HasLeds> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in ProtocolKind::ALL {
            assert_eq!(kind.name().parse::<ProtocolKind>(), Ok(kind));
        }
        assert!("sata".parse::<ProtocolKind>().is_err());
    }

    #[test]
    fn geometry_accessors() {
        let lcd = HandshakeResult::panel(100, 0, (320, 320));
        assert_eq!(lcd.resolution(), Some((320, 320)));
        assert!(lcd.topology().is_none());
    }
}
