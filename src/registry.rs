//! Static table of supported VID:PID pairs.

use trcc_core::{DeviceError, ProtocolKind, Result};

/// One supported USB identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownDevice {
    pub vendor_id: u16,
    pub product_id: u16,
    pub kind: ProtocolKind,
    pub vendor: &'static str,
    pub product: &'static str,
}

const fn known(
    vendor_id: u16,
    product_id: u16,
    kind: ProtocolKind,
    vendor: &'static str,
    product: &'static str,
) -> KnownDevice {
    KnownDevice {
        vendor_id,
        product_id,
        kind,
        vendor,
        product,
    }
}

pub const KNOWN_DEVICES: &[KnownDevice] = &[
    // usb mass storage, /dev/sgN
    known(0x87CD, 0x70DB, ProtocolKind::Scsi, "Thermalright", "LCD Display (USBLCD)"),
    known(0x0416, 0x5406, ProtocolKind::Scsi, "Winbond", "LCD Display (USBLCD)"),
    known(0x0402, 0x3922, ProtocolKind::Scsi, "ALi Corp", "FROZEN WARFRAME"),
    // hid lcd
    known(0x0416, 0x5302, ProtocolKind::HidLcdType2, "Winbond", "USBDISPLAY (HID)"),
    known(0x0416, 0x530A, ProtocolKind::HidLcdType2, "Winbond", "LCD Display (HID H)"),
    known(0x0418, 0x5303, ProtocolKind::HidLcdType3, "ALi Corp", "LCD Display (HID)"),
    known(0x0418, 0x5304, ProtocolKind::HidLcdType3, "ALi Corp", "LCD Display (HID)"),
    known(0x0416, 0x53E6, ProtocolKind::HidLcdType3, "Winbond", "LCD Display (HID ALi)"),
    // rgb
    known(0x0416, 0x8001, ProtocolKind::HidLed, "Winbond", "LED Controller"),
    // vendor bulk
    known(0x87AD, 0x70DB, ProtocolKind::Bulk, "ChiZhu Tech", "USB Display"),
];

/// Identify a VID:PID pair
pub fn lookup(vendor_id: u16, product_id: u16) -> Result<&'static KnownDevice> {
    KNOWN_DEVICES
        .iter()
        .find(|d| d.vendor_id == vendor_id && d.product_id == product_id)
        .ok_or(DeviceError::UnknownDevice {
            vendor_id,
            product_id,
        })
}
