//! Descriptor to protocol construction. Nothing here touches the device.

use trcc_bulk::BulkLcd;
use trcc_core::transport::{HidTransport, Transport, UsbTransport};
use trcc_core::{DeviceDescriptor, DeviceError, DeviceHandle, DeviceProtocol, ProtocolKind, Result};
use trcc_hid_lcd::{HidLcdType2, HidLcdType3};
use trcc_led::HidLed;
use trcc_scsi::ScsiLcd;

/// HID report payload size per protocol when going through the OS HID driver
const fn report_size(kind: ProtocolKind) -> usize {
    match kind {
        ProtocolKind::HidLcdType2 => 512,
        _ => HidTransport::REPORT_SIZE,
    }
}

fn transport(descriptor: &DeviceDescriptor) -> Result<Box<dyn Transport>> {
    match &descriptor.handle {
        DeviceHandle::Usb { bus, address } => Ok(Box::new(
            UsbTransport::new(descriptor.vendor_id, descriptor.product_id).at(*bus, *address),
        )),
        DeviceHandle::Hid(path) if descriptor.kind != ProtocolKind::Bulk => Ok(Box::new(
            HidTransport::from_path(path.clone()).with_report_size(report_size(descriptor.kind)),
        )),
        handle => Err(mismatch(descriptor, handle)),
    }
}

fn mismatch(descriptor: &DeviceDescriptor, handle: &DeviceHandle) -> DeviceError {
    DeviceError::ProtocolMismatch(format!(
        "{} ({}) cannot be driven through {handle}",
        descriptor.vid_pid(),
        descriptor.kind
    ))
}

/// Build the protocol for a discovered device.
///
/// Fails only when the descriptor pairs a kind with a handle it cannot use, which means
/// discovery and the registry disagree.
pub fn create(descriptor: &DeviceDescriptor) -> Result<Box<dyn DeviceProtocol>> {
    let protocol: Box<dyn DeviceProtocol> = match (descriptor.kind, &descriptor.handle) {
        (ProtocolKind::Scsi, DeviceHandle::ScsiNode(path)) => Box::new(ScsiLcd::for_node(path)),
        (ProtocolKind::Scsi, handle) => return Err(mismatch(descriptor, handle)),
        (_, DeviceHandle::ScsiNode(_)) => return Err(mismatch(descriptor, &descriptor.handle)),
        (ProtocolKind::HidLcdType2, _) => Box::new(HidLcdType2::new(transport(descriptor)?)),
        (ProtocolKind::HidLcdType3, _) => Box::new(HidLcdType3::new(transport(descriptor)?)),
        (ProtocolKind::HidLed, _) => Box::new(HidLed::new(transport(descriptor)?)),
        (ProtocolKind::Bulk, _) => Box::new(BulkLcd::new(transport(descriptor)?)),
    };
    Ok(protocol)
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;
    use std::path::PathBuf;

    use super::*;
    use crate::registry;

    fn descriptor(vid: u16, pid: u16, handle: DeviceHandle) -> DeviceDescriptor {
        let known = registry::lookup(vid, pid).unwrap();
        DeviceDescriptor {
            vendor_id: vid,
            product_id: pid,
            bus_path: Some("1-2".into()),
            handle,
            kind: known.kind,
            ordinal: 0,
            vendor: known.vendor,
            product: known.product,
        }
    }

    #[test]
    fn every_registered_kind_builds() {
        for known in registry::KNOWN_DEVICES {
            let handle = match known.kind {
                ProtocolKind::Scsi => DeviceHandle::ScsiNode(PathBuf::from("/dev/sg9")),
                _ => DeviceHandle::Usb { bus: 1, address: 2 },
            };
            let protocol = create(&descriptor(known.vendor_id, known.product_id, handle)).unwrap();
            assert_eq!(protocol.kind(), known.kind);
        }
    }

    #[test]
    fn hid_path_builds_for_hid_kinds_only() {
        let path = DeviceHandle::Hid(CString::new("/dev/hidraw3").unwrap());
        let led = create(&descriptor(0x0416, 0x8001, path.clone())).unwrap();
        assert_eq!(led.kind(), ProtocolKind::HidLed);
        assert!(matches!(
            create(&descriptor(0x87AD, 0x70DB, path)),
            Err(DeviceError::ProtocolMismatch(_))
        ));
    }

    #[test]
    fn scsi_kind_needs_a_node() {
        let usb = DeviceHandle::Usb { bus: 1, address: 2 };
        assert!(matches!(
            create(&descriptor(0x0402, 0x3922, usb)),
            Err(DeviceError::ProtocolMismatch(_))
        ));
        let node = DeviceHandle::ScsiNode(PathBuf::from("/dev/sg1"));
        assert!(matches!(
            create(&descriptor(0x0416, 0x5302, node)),
            Err(DeviceError::ProtocolMismatch(_))
        ));
    }
}
