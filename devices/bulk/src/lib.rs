//! Vendor specific bulk LCDs (`87AD:70DB`).
//!
//! The interface is class 255 with one bulk pair; no kernel driver should claim it.
//! One 64-byte handshake, then frames as a 64-byte header plus raw RGB565 in a single
//! bulk write, terminated by a zero-length packet when the total is 512-byte aligned.

use tracing::{debug, info};
use trcc_core::frame::frame_len;
use trcc_core::resolution::pm_to_resolution;
use trcc_core::transport::{write_all, Transport, EP_IN, EP_OUT};
use trcc_core::{DeviceError, DeviceProtocol, HandshakeResult, ProtocolKind, Result};

pub mod consts {
    use std::time::Duration;

    pub const VENDOR_ID: u16 = 0x87AD;
    pub const PRODUCT_ID: u16 = 0x70DB;
    pub const HANDSHAKE_SIZE: usize = 64;
    pub const RESPONSE_SIZE: usize = 1024;
    pub const HEADER_SIZE: usize = 64;
    /// Transfers that fill whole packets need a ZLP to terminate
    pub const MAX_PACKET: usize = 512;
    pub const TIMEOUT: Duration = Duration::from_millis(1000);
}

const PROTOCOL: &str = ProtocolKind::Bulk.name();
const MAGIC: [u8; 4] = [0x12, 0x34, 0x56, 0x78];
const PM_OFFSET: usize = 24;
const SUB_OFFSET: usize = 36;
const MIN_RESPONSE: usize = 41;

pub fn handshake_packet() -> [u8; consts::HANDSHAKE_SIZE] {
    let mut packet = [0u8; consts::HANDSHAKE_SIZE];
    packet[..4].copy_from_slice(&MAGIC);
    packet[56] = 0x01;
    packet
}

/// Resolution codes this family reports directly; other PMs go through the FBL tables
pub fn resolution(pm: u8, sub: u8) -> (u32, u32) {
    match pm {
        36 => (240, 240),
        50 => (240, 320),
        51 => (320, 240),
        100 => (320, 320),
        101 => (480, 480),
        _ => pm_to_resolution(pm, sub),
    }
}

pub fn frame_header(payload_len: usize) -> [u8; consts::HEADER_SIZE] {
    let mut header = [0u8; consts::HEADER_SIZE];
    header[60..64].copy_from_slice(&(payload_len as u32).to_le_bytes());
    header
}

pub struct BulkLcd {
    transport: Box<dyn Transport>,
    session: Option<HandshakeResult>,
}

impl BulkLcd {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            session: None,
        }
    }

    /// Header plus data as one transfer. The header carries the size actually sent.
    fn write_frame(&mut self, data: &[u8], stage: &'static str) -> Result<()> {
        let res = self
            .session
            .as_ref()
            .and_then(HandshakeResult::resolution)
            .ok_or(DeviceError::HandshakeRequired {
                protocol: PROTOCOL,
                stage,
            })?;
        if data.len() > frame_len(res) {
            return Err(DeviceError::InvalidFrame {
                expected: frame_len(res),
                actual: data.len(),
            });
        }

        let mut transfer = Vec::with_capacity(consts::HEADER_SIZE + data.len());
        transfer.extend_from_slice(&frame_header(data.len()));
        transfer.extend_from_slice(data);

        write_all(&mut *self.transport, EP_OUT, &transfer, consts::TIMEOUT)
            .map_err(|e| e.at(PROTOCOL, stage))?;
        if transfer.len() % consts::MAX_PACKET == 0 {
            write_all(&mut *self.transport, EP_OUT, &[], consts::TIMEOUT)
                .map_err(|e| e.at(PROTOCOL, stage))?;
        }
        Ok(())
    }
}

impl DeviceProtocol for BulkLcd {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Bulk
    }

    fn handshake(&mut self) -> Result<HandshakeResult> {
        self.transport
            .open()
            .map_err(|e| e.at(PROTOCOL, "open"))?;
        write_all(
            &mut *self.transport,
            EP_OUT,
            &handshake_packet(),
            consts::TIMEOUT,
        )
        .map_err(|e| e.at(PROTOCOL, "handshake"))?;
        let resp = match self
            .transport
            .read(EP_IN, consts::RESPONSE_SIZE, consts::TIMEOUT)
        {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                return Err(DeviceError::handshake(PROTOCOL, "no response"))
            },
            Err(e) => return Err(e.at(PROTOCOL, "handshake")),
        };
        debug!(len = resp.len(), head = ?&resp[..resp.len().min(64)], "bulk handshake response");

        if resp.len() < MIN_RESPONSE || resp[PM_OFFSET] == 0 {
            return Err(DeviceError::handshake(
                PROTOCOL,
                format!("no product model in {}-byte response", resp.len()),
            ));
        }
        let pm = resp[PM_OFFSET];
        let sub = resp[SUB_OFFSET];
        let res = resolution(pm, sub);
        info!(pm, sub, ?res, "bulk handshake complete");

        let result = HandshakeResult::panel(pm, sub, res);
        self.session = Some(result.clone());
        Ok(result)
    }

    fn send_frame(&mut self, data: &[u8]) -> Result<()> {
        self.write_frame(data, "frame")
    }

    fn clear(&mut self) -> Result<()> {
        let res = self.session.as_ref().and_then(HandshakeResult::resolution);
        let black = vec![0u8; res.map_or(0, frame_len)];
        self.write_frame(&black, "clear")
    }

    fn close(&mut self) {
        self.transport.close();
        self.session = None;
    }
}

#[cfg(test)]
mod tests {
    use trcc_core::mock::{Fault, MockTransport};

    use super::*;

    fn response(pm: u8, sub: u8) -> Vec<u8> {
        let mut resp = vec![0u8; consts::RESPONSE_SIZE];
        resp[PM_OFFSET] = pm;
        resp[SUB_OFFSET] = sub;
        resp
    }

    #[test]
    fn handshake_packet_layout() {
        let packet = handshake_packet();
        assert_eq!(&packet[..4], &[0x12, 0x34, 0x56, 0x78]);
        assert_eq!(packet[56], 1);
        assert_eq!(packet.iter().filter(|&&b| b != 0).count(), 5);
    }

    #[test]
    fn resolution_codes() {
        assert_eq!(resolution(101, 0), (480, 480));
        assert_eq!(resolution(51, 0), (320, 240));
        // Falls through to the FBL tables
        assert_eq!(resolution(64, 0), (1600, 720));
    }

    #[test]
    fn handshake_reads_pm_and_sub() {
        let mock = MockTransport::new();
        mock.push_read(response(100, 7));
        let mut lcd = BulkLcd::new(mock.clone());
        let result = lcd.handshake().unwrap();
        assert_eq!((result.pm, result.sub), (100, 7));
        assert_eq!(result.resolution(), Some((320, 320)));
        assert_eq!(mock.writes()[0].timeout, consts::TIMEOUT);
    }

    #[test]
    fn zero_pm_or_short_response_fails() {
        let mock = MockTransport::new();
        mock.push_read(response(0, 0)).push_read(vec![1u8; 40]);
        let mut lcd = BulkLcd::new(mock.clone());
        assert!(matches!(lcd.handshake(), Err(DeviceError::HandshakeFailed { .. })));
        assert!(matches!(lcd.handshake(), Err(DeviceError::HandshakeFailed { .. })));
        // Silent device
        assert!(matches!(lcd.handshake(), Err(DeviceError::HandshakeFailed { .. })));
    }

    #[test]
    fn frame_is_header_plus_data() {
        let mock = MockTransport::new();
        mock.push_read(response(36, 0));
        let mut lcd = BulkLcd::new(mock.clone());
        lcd.handshake().unwrap();

        // 64 + 115200 is not 512 aligned
        lcd.send_frame(&vec![0xAB; 240 * 240 * 2]).unwrap();
        let writes = mock.written();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[1].len(), 64 + 115_200);
        assert_eq!(&writes[1][60..64], &115_200u32.to_le_bytes());
        assert_eq!(writes[1][64], 0xAB);

        assert!(matches!(
            lcd.send_frame(&vec![0; 115_202]),
            Err(DeviceError::InvalidFrame { .. })
        ));
    }

    #[test]
    fn zlp_follows_512_aligned_transfer() {
        let mock = MockTransport::new();
        mock.push_read(response(100, 0));
        let mut lcd = BulkLcd::new(mock.clone());
        lcd.handshake().unwrap();

        lcd.send_frame(&[0x11; 448]).unwrap();
        let writes = mock.written();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[1].len(), 512);
        assert!(writes[2].is_empty());

        lcd.send_frame(&[0x11; 449]).unwrap();
        assert_eq!(mock.written().len(), 4);
    }

    #[test]
    fn clear_sends_full_black_frame() {
        let mock = MockTransport::new();
        mock.push_read(response(101, 0));
        let mut lcd = BulkLcd::new(mock.clone());
        assert!(matches!(
            lcd.clear(),
            Err(DeviceError::HandshakeRequired { .. })
        ));
        lcd.handshake().unwrap();
        lcd.clear().unwrap();
        let frame = &mock.written()[1];
        assert_eq!(frame.len(), 64 + 480 * 480 * 2);
        assert!(frame[64..].iter().all(|&b| b == 0));
    }

    #[test]
    fn unplug_mid_frame_is_transport_error() {
        let mock = MockTransport::new();
        mock.push_read(response(100, 0));
        let mut lcd = BulkLcd::new(mock.clone());
        lcd.handshake().unwrap();
        mock.fail_write(0, Fault::NoDevice);
        assert!(matches!(
            lcd.send_frame(&[0; 8]),
            Err(DeviceError::Transport { stage: "frame", .. })
        ));
    }
}
