//! Device discovery.
//!
//! LCDs that enumerate as USB mass storage are reached through their SCSI generic node, found
//! by scanning sysfs for the `USBLCD` vendor string. Everything else comes from the USB device
//! list. Candidates are matched against the registry, sorted by bus path and numbered.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use hidapi::HidApi;
use tracing::{debug, trace, warn};
use trcc_core::{DeviceDescriptor, DeviceHandle, ProtocolKind, Result, TransportError};

use crate::config::UsbBackend;
use crate::registry;

/// sysfs class directory listing `sg*` nodes
pub const SYSFS_SCSI_GENERIC: &str = "/sys/class/scsi_generic";
/// Vendor string the panel firmware reports over SCSI INQUIRY
const SCSI_VENDOR: &str = trcc_scsi::consts::SYSFS_VENDOR;
/// How far up the sysfs tree to look for the owning USB device
const MAX_SYSFS_DEPTH: usize = 10;
/// Identity assumed for a SCSI panel whose USB parent could not be read
const FALLBACK_SCSI_ID: (u16, u16) = (
    trcc_scsi::consts::THERMALRIGHT_VENDOR_ID,
    trcc_scsi::consts::THERMALRIGHT_PRODUCT_ID,
);

/// A device seen on the bus, not yet matched against the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus_path: Option<String>,
    pub handle: DeviceHandle,
}

/// Enumerate supported devices.
///
/// An empty list is not an error. Access denials while enumerating are returned so the caller
/// can point the operator at udev rules.
pub fn discover(backend: UsbBackend) -> Result<Vec<DeviceDescriptor>> {
    let mut candidates = if cfg!(target_os = "linux") {
        scan_scsi_generic(Path::new(SYSFS_SCSI_GENERIC))?
    } else {
        Vec::new()
    };
    match backend {
        UsbBackend::Libusb => candidates.extend(usb_candidates(|_| true)?),
        UsbBackend::Hidapi => {
            candidates.extend(usb_candidates(|kind| {
                !matches!(
                    kind,
                    ProtocolKind::HidLcdType2 | ProtocolKind::HidLcdType3 | ProtocolKind::HidLed
                )
            })?);
            candidates.extend(hid_candidates()?);
        },
    }

    let devices = classify(candidates);
    debug!(count = devices.len(), "discovery complete");
    Ok(devices)
}

fn enumerate_error(stage: &'static str) -> impl Fn(io::Error) -> trcc_core::DeviceError {
    move |e| TransportError::Io(e).at("discovery", stage)
}

/// Scan a `scsi_generic` class directory for panel nodes
pub fn scan_scsi_generic(class_dir: &Path) -> Result<Vec<Candidate>> {
    let entries = match fs::read_dir(class_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %class_dir.display(), "no scsi generic class, is the sg module loaded?");
            return Ok(Vec::new());
        },
        Err(e) => return Err(enumerate_error("sysfs")(e)),
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(enumerate_error("sysfs"))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with("sg") {
            continue;
        }
        let device_dir = entry.path().join("device");
        let vendor = match fs::read_to_string(device_dir.join("vendor")) {
            Ok(vendor) => vendor,
            Err(e) => {
                trace!(node = name, error = %e, "no vendor attribute");
                continue;
            },
        };
        if !vendor.contains(SCSI_VENDOR) {
            continue;
        }

        let (vendor_id, product_id, bus_path) = match usb_parent(&device_dir) {
            Some((vid, pid, bus_path)) => (vid, pid, Some(bus_path)),
            None => {
                warn!(node = name, "usb parent not found, assuming thermalright ids");
                (FALLBACK_SCSI_ID.0, FALLBACK_SCSI_ID.1, None)
            },
        };
        candidates.push(Candidate {
            vendor_id,
            product_id,
            bus_path,
            handle: DeviceHandle::ScsiNode(PathBuf::from("/dev").join(&name)),
        });
    }
    Ok(candidates)
}

/// Walk up from a SCSI device to the USB device that owns it
fn usb_parent(device_dir: &Path) -> Option<(u16, u16, String)> {
    let resolved = fs::canonicalize(device_dir).ok()?;
    resolved
        .ancestors()
        .skip(1)
        .take(MAX_SYSFS_DEPTH)
        .find_map(|dir| {
            let vid = read_hex(&dir.join("idVendor"))?;
            let pid = read_hex(&dir.join("idProduct"))?;
            let bus_path = dir.file_name()?.to_string_lossy().into_owned();
            Some((vid, pid, bus_path))
        })
}

fn read_hex(path: &Path) -> Option<u16> {
    let text = fs::read_to_string(path).ok()?;
    u16::from_str_radix(text.trim(), 16).ok()
}

/// Registered devices from the libusb device list, for the kinds `wanted` accepts
fn usb_candidates(wanted: impl Fn(ProtocolKind) -> bool) -> Result<Vec<Candidate>> {
    let devices = rusb::devices().map_err(|e| TransportError::Usb(e).at("discovery", "usb"))?;
    let mut candidates = Vec::new();
    for device in devices.iter() {
        let desc = match device.device_descriptor() {
            Ok(desc) => desc,
            Err(e) => {
                trace!(error = %e, "unreadable device descriptor");
                continue;
            },
        };
        let Ok(known) = registry::lookup(desc.vendor_id(), desc.product_id()) else {
            continue;
        };
        if !wanted(known.kind) {
            continue;
        }
        // Same naming as sysfs, so SCSI nodes and USB entries line up
        let bus_path = match device.port_numbers() {
            Ok(ports) if !ports.is_empty() => {
                let ports: Vec<String> = ports.iter().map(u8::to_string).collect();
                format!("{}-{}", device.bus_number(), ports.join("."))
            },
            _ => format!("{}-{}", device.bus_number(), device.address()),
        };
        candidates.push(Candidate {
            vendor_id: desc.vendor_id(),
            product_id: desc.product_id(),
            bus_path: Some(bus_path),
            handle: DeviceHandle::Usb {
                bus: device.bus_number(),
                address: device.address(),
            },
        });
    }
    Ok(candidates)
}

/// Registered HID devices from the OS HID driver. One entry per device path.
fn hid_candidates() -> Result<Vec<Candidate>> {
    let api = HidApi::new().map_err(|e| TransportError::Hid(e).at("discovery", "hid"))?;
    let mut seen = HashSet::new();
    let candidates = api
        .device_list()
        .filter(|info| registry::lookup(info.vendor_id(), info.product_id()).is_ok())
        .filter(|info| seen.insert(info.path().to_owned()))
        .map(|info| Candidate {
            vendor_id: info.vendor_id(),
            product_id: info.product_id(),
            bus_path: None,
            handle: DeviceHandle::Hid(info.path().to_owned()),
        })
        .collect();
    Ok(candidates)
}

/// Match candidates against the registry, drop duplicates, sort and number them.
///
/// Mass storage panels are only drivable through their SCSI node, so their raw USB entry is
/// dropped. Unregistered identities are skipped.
pub fn classify(candidates: Vec<Candidate>) -> Vec<DeviceDescriptor> {
    let scsi_paths: HashSet<String> = candidates
        .iter()
        .filter(|c| matches!(c.handle, DeviceHandle::ScsiNode(_)))
        .filter_map(|c| c.bus_path.clone())
        .collect();

    let mut devices: Vec<DeviceDescriptor> = candidates
        .into_iter()
        .filter_map(|c| {
            let known = match registry::lookup(c.vendor_id, c.product_id) {
                Ok(known) => known,
                Err(e) => {
                    trace!(error = %e, "skipping");
                    return None;
                },
            };
            let is_node = matches!(c.handle, DeviceHandle::ScsiNode(_));
            if is_node != (known.kind == ProtocolKind::Scsi) {
                if !is_node && !c.bus_path.as_ref().is_some_and(|p| scsi_paths.contains(p)) {
                    warn!(
                        "{:04x}:{:04x} has no scsi generic node, is the sg module loaded?",
                        c.vendor_id, c.product_id
                    );
                } else if is_node {
                    warn!(
                        "{:04x}:{:04x} is not a scsi panel but has node {}",
                        c.vendor_id, c.product_id, c.handle
                    );
                }
                return None;
            }
            Some(DeviceDescriptor {
                vendor_id: c.vendor_id,
                product_id: c.product_id,
                bus_path: c.bus_path,
                handle: c.handle,
                kind: known.kind,
                ordinal: 0,
                vendor: known.vendor,
                product: known.product,
            })
        })
        .collect();

    devices.sort_by(|a, b| {
        a.bus_path
            .cmp(&b.bus_path)
            .then(a.vendor_id.cmp(&b.vendor_id))
            .then(a.product_id.cmp(&b.product_id))
            .then_with(|| a.handle.to_string().cmp(&b.handle.to_string()))
    });
    for (ordinal, device) in devices.iter_mut().enumerate() {
        device.ordinal = ordinal;
    }
    devices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usb(vid: u16, pid: u16, bus_path: &str, address: u8) -> Candidate {
        Candidate {
            vendor_id: vid,
            product_id: pid,
            bus_path: Some(bus_path.into()),
            handle: DeviceHandle::Usb { bus: 1, address },
        }
    }

    fn node(vid: u16, pid: u16, bus_path: &str, sg: &str) -> Candidate {
        Candidate {
            vendor_id: vid,
            product_id: pid,
            bus_path: Some(bus_path.into()),
            handle: DeviceHandle::ScsiNode(PathBuf::from(format!("/dev/{sg}"))),
        }
    }

    #[test]
    fn ali_frozen_warframe_is_scsi() {
        let devices = classify(vec![
            usb(0x0402, 0x3922, "2-1.4", 7),
            node(0x0402, 0x3922, "2-1.4", "sg2"),
        ]);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].kind, ProtocolKind::Scsi);
        assert_eq!(devices[0].handle.to_string(), "/dev/sg2");
        assert_eq!(devices[0].product, "FROZEN WARFRAME");
    }

    #[test]
    fn sorted_by_bus_path_with_ordinals() {
        let devices = classify(vec![
            usb(0x0416, 0x8001, "3-2", 4),
            usb(0x046D, 0xC52B, "1-1", 2),
            usb(0x0416, 0x5302, "1-4", 3),
            usb(0x87AD, 0x70DB, "1-10", 9),
        ]);
        let order: Vec<_> = devices
            .iter()
            .map(|d| (d.ordinal, d.bus_path.as_deref().unwrap(), d.kind))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, "1-10", ProtocolKind::Bulk),
                (1, "1-4", ProtocolKind::HidLcdType2),
                (2, "3-2", ProtocolKind::HidLed),
            ]
        );
    }

    #[test]
    fn mass_storage_without_node_is_dropped() {
        assert!(classify(vec![usb(0x87CD, 0x70DB, "1-2", 5)]).is_empty());
        assert!(classify(Vec::new()).is_empty());
    }

    #[test]
    fn missing_class_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let found = scan_scsi_generic(&dir.path().join("scsi_generic")).unwrap();
        assert!(found.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn sysfs_scan_finds_usb_parent() {
        use std::os::unix::fs::symlink;

        let root = tempfile::tempdir().unwrap();
        let usb_dev = root.path().join("devices/usb2/2-1/2-1.4");
        let scsi_dev = usb_dev.join("2-1.4:1.0/host6/target6:0:0/6:0:0:0");
        fs::create_dir_all(&scsi_dev).unwrap();
        fs::write(usb_dev.join("idVendor"), "0402\n").unwrap();
        fs::write(usb_dev.join("idProduct"), "3922\n").unwrap();
        fs::write(scsi_dev.join("vendor"), "USBLCD  \n").unwrap();

        // A disk that must be ignored
        let disk = root.path().join("devices/pci/ata1/0:0:0:0");
        fs::create_dir_all(&disk).unwrap();
        fs::write(disk.join("vendor"), "ATA     \n").unwrap();

        let class = root.path().join("class/scsi_generic");
        for (sg, target) in [("sg2", &scsi_dev), ("sg0", &disk)] {
            fs::create_dir_all(class.join(sg)).unwrap();
            symlink(target, class.join(sg).join("device")).unwrap();
        }

        let found = scan_scsi_generic(&class).unwrap();
        assert_eq!(found, vec![node(0x0402, 0x3922, "2-1.4", "sg2")]);
    }

    #[cfg(unix)]
    #[test]
    fn orphan_node_falls_back_to_thermalright() {
        let root = tempfile::tempdir().unwrap();
        let device = root.path().join("scsi_generic/sg1/device");
        fs::create_dir_all(&device).unwrap();
        fs::write(device.join("vendor"), "USBLCD\n").unwrap();

        let found = scan_scsi_generic(&root.path().join("scsi_generic")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!((found[0].vendor_id, found[0].product_id), (0x87CD, 0x70DB));
        assert_eq!(found[0].bus_path, None);
    }
}
