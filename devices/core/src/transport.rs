//! Byte-level USB transports.
//!
//! The LCD and LED protocols only ever need "write these bytes to an endpoint" and "read up
//! to N bytes from an endpoint". [`UsbTransport`] does that through libusb, picking bulk or
//! interrupt transfers from the endpoint descriptor. [`HidTransport`] goes through the OS HID
//! driver instead, which on some systems works without udev rules.

use std::ffi::CString;
use std::time::Duration;

use hidapi::{HidApi, HidDevice};
use rusb::{Direction, GlobalContext, TransferType, UsbContext};
use tracing::debug;

use crate::TransportError;

/// OUT endpoint the vendor firmware listens on
pub const EP_OUT: u8 = 0x02;
/// IN endpoint the vendor firmware answers on
pub const EP_IN: u8 = 0x81;
/// Interface every supported device exposes its endpoints on
pub const USB_INTERFACE: u8 = 0;

type TransportResult<T> = std::result::Result<T, TransportError>;

/// Endpoint level byte transport
pub trait Transport: Send {
    /// Open the device and claim its interface
    fn open(&mut self) -> TransportResult<()>;
    /// Release the interface. Safe to call when already closed.
    fn close(&mut self);
    fn is_open(&self) -> bool;
    /// Write to an endpoint, returning the bytes transferred
    fn write(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> TransportResult<usize>;
    /// Read up to `len` bytes from an endpoint
    fn read(&mut self, endpoint: u8, len: usize, timeout: Duration) -> TransportResult<Vec<u8>>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> TransportResult<()> {
        (**self).open()
    }
    fn close(&mut self) {
        (**self).close()
    }
    fn is_open(&self) -> bool {
        (**self).is_open()
    }
    fn write(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> TransportResult<usize> {
        (**self).write(endpoint, data, timeout)
    }
    fn read(&mut self, endpoint: u8, len: usize, timeout: Duration) -> TransportResult<Vec<u8>> {
        (**self).read(endpoint, len, timeout)
    }
}

/// Write all of `data`, treating a partial write as an error
pub fn write_all(
    transport: &mut dyn Transport,
    endpoint: u8,
    data: &[u8],
    timeout: Duration,
) -> TransportResult<()> {
    let written = transport.write(endpoint, data, timeout)?;
    if written != data.len() {
        return Err(TransportError::ShortTransfer {
            expected: data.len(),
            actual: written,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct Endpoint {
    address: u8,
    transfer: TransferType,
}

/// libusb transport for one device, located by VID:PID and optionally bus/address
pub struct UsbTransport {
    vendor_id: u16,
    product_id: u16,
    location: Option<(u8, u8)>,
    handle: Option<rusb::DeviceHandle<GlobalContext>>,
    ep_out: Option<Endpoint>,
    ep_in: Option<Endpoint>,
}

impl UsbTransport {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            location: None,
            handle: None,
            ep_out: None,
            ep_in: None,
        }
    }

    /// Pin the transport to one bus/address pair
    pub fn at(mut self, bus: u8, address: u8) -> Self {
        self.location = Some((bus, address));
        self
    }

    fn find(&self) -> TransportResult<rusb::Device<GlobalContext>> {
        for device in GlobalContext::default().devices()?.iter() {
            let Ok(desc) = device.device_descriptor() else {
                continue;
            };
            if desc.vendor_id() != self.vendor_id || desc.product_id() != self.product_id {
                continue;
            }
            if let Some((bus, address)) = self.location {
                if device.bus_number() != bus || device.address() != address {
                    continue;
                }
            }
            return Ok(device);
        }
        Err(TransportError::NotFound)
    }

    /// Some units wire OUT to 0x01 instead of 0x02, so take whatever the interface declares
    fn detect_endpoints(&mut self, device: &rusb::Device<GlobalContext>) {
        let Ok(config) = device.active_config_descriptor() else {
            debug!("endpoint detection failed, using protocol defaults");
            return;
        };
        let Some(interface) = config.interfaces().find(|i| i.number() == USB_INTERFACE) else {
            return;
        };
        for desc in interface.descriptors().take(1) {
            for ep in desc.endpoint_descriptors() {
                let endpoint = Endpoint {
                    address: ep.address(),
                    transfer: ep.transfer_type(),
                };
                match ep.direction() {
                    Direction::Out if self.ep_out.is_none() => self.ep_out = Some(endpoint),
                    Direction::In if self.ep_in.is_none() => self.ep_in = Some(endpoint),
                    _ => {},
                }
            }
        }
        debug!(
            ep_out = ?self.ep_out.map(|e| e.address),
            ep_in = ?self.ep_in.map(|e| e.address),
            "detected endpoints"
        );
    }

    fn resolve(detected: Option<Endpoint>, requested: u8) -> Endpoint {
        detected.unwrap_or(Endpoint {
            address: requested,
            transfer: TransferType::Bulk,
        })
    }
}

impl Transport for UsbTransport {
    fn open(&mut self) -> TransportResult<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let device = self.find()?;
        let handle = device.open()?;
        // Not supported on every platform; claiming still works where it isn't
        let _ = handle.set_auto_detach_kernel_driver(true);
        handle.claim_interface(USB_INTERFACE)?;
        self.detect_endpoints(&device);
        self.handle = Some(handle);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.release_interface(USB_INTERFACE);
        }
        self.ep_out = None;
        self.ep_in = None;
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn write(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> TransportResult<usize> {
        let handle = self.handle.as_ref().ok_or(TransportError::NotOpen)?;
        let ep = Self::resolve(self.ep_out, endpoint);
        let written = match ep.transfer {
            TransferType::Interrupt => handle.write_interrupt(ep.address, data, timeout)?,
            _ => handle.write_bulk(ep.address, data, timeout)?,
        };
        Ok(written)
    }

    fn read(&mut self, endpoint: u8, len: usize, timeout: Duration) -> TransportResult<Vec<u8>> {
        let handle = self.handle.as_ref().ok_or(TransportError::NotOpen)?;
        let ep = Self::resolve(self.ep_in, endpoint);
        let mut buf = vec![0u8; len];
        let read = match ep.transfer {
            TransferType::Interrupt => handle.read_interrupt(ep.address, &mut buf, timeout)?,
            _ => handle.read_bulk(ep.address, &mut buf, timeout)?,
        };
        buf.truncate(read);
        Ok(buf)
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// hidapi transport. Endpoints are ignored; the OS routes reports to the single
/// interrupt pair. Writes are split into reports, each prefixed with report id 0.
pub struct HidTransport {
    target: HidTarget,
    report_size: usize,
    device: Option<HidDevice>,
}

enum HidTarget {
    Path(CString),
    Ids { vendor_id: u16, product_id: u16 },
}

impl HidTransport {
    /// Default report payload size
    pub const REPORT_SIZE: usize = 64;

    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            target: HidTarget::Ids {
                vendor_id,
                product_id,
            },
            report_size: Self::REPORT_SIZE,
            device: None,
        }
    }

    pub fn from_path(path: CString) -> Self {
        Self {
            target: HidTarget::Path(path),
            report_size: Self::REPORT_SIZE,
            device: None,
        }
    }

    pub fn with_report_size(mut self, size: usize) -> Self {
        self.report_size = size.max(1);
        self
    }
}

/// Split `data` into output reports of report id 0 plus `size` payload bytes. The last
/// report is zero-padded; Windows rejects short output reports.
fn output_reports(data: &[u8], size: usize) -> impl Iterator<Item = Vec<u8>> + '_ {
    data.chunks(size).map(move |chunk| {
        let mut report = vec![0u8; size + 1];
        report[1..=chunk.len()].copy_from_slice(chunk);
        report
    })
}

impl Transport for HidTransport {
    fn open(&mut self) -> TransportResult<()> {
        if self.device.is_some() {
            return Ok(());
        }
        let api = HidApi::new()?;
        let device = match &self.target {
            HidTarget::Path(path) => api.open_path(path)?,
            HidTarget::Ids {
                vendor_id,
                product_id,
            } => api.open(*vendor_id, *product_id)?,
        };
        device.set_blocking_mode(true)?;
        self.device = Some(device);
        Ok(())
    }

    fn close(&mut self) {
        self.device = None;
    }

    fn is_open(&self) -> bool {
        self.device.is_some()
    }

    fn write(&mut self, _endpoint: u8, data: &[u8], _timeout: Duration) -> TransportResult<usize> {
        let device = self.device.as_ref().ok_or(TransportError::NotOpen)?;
        let mut total = 0;
        for (report, chunk) in
            output_reports(data, self.report_size).zip(data.chunks(self.report_size))
        {
            let written = device.write(&report)?;
            // hidapi counts the report id byte
            total += written.saturating_sub(1).min(chunk.len());
        }
        Ok(total)
    }

    fn read(&mut self, _endpoint: u8, len: usize, timeout: Duration) -> TransportResult<Vec<u8>> {
        let device = self.device.as_ref().ok_or(TransportError::NotOpen)?;
        let mut buf = vec![0u8; len];
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let read = device.read_timeout(&mut buf, millis)?;
        if read == 0 {
            return Err(TransportError::Timeout);
        }
        buf.truncate(read);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_reports_are_full_size() {
        let data: Vec<u8> = (0..130u8).collect();
        let reports: Vec<_> = output_reports(&data, 64).collect();
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.len() == 65 && r[0] == 0));
        assert_eq!(&reports[1][1..], &data[64..128]);
        assert_eq!(&reports[2][1..3], &data[128..]);
        assert!(reports[2][3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn frame_tail_is_zero_padded() {
        let data = vec![0xAB; 204816];
        let reports: Vec<_> = output_reports(&data, 512).collect();
        assert_eq!(reports.len(), 401);
        assert_eq!(reports[400].len(), 513);
        assert_eq!(reports[400][1..17], [0xAB; 16]);
        assert!(reports[400][17..].iter().all(|&b| b == 0));
    }
}
