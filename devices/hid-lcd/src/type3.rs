//! Type 3 ("ALi" variant): SCSI-shaped `F5` packets over raw endpoints, one fixed-size
//! RGB565 write per frame followed by a 16-byte acknowledgement.

use tracing::debug;
use trcc_core::handshake::{hex, Exchange};
use trcc_core::resolution::{hid_letter_to_resolution, DEFAULT_RESOLUTION};
use trcc_core::timing::{thread_sleep, SharedSleep};
use trcc_core::transport::{write_all, Transport, EP_IN, EP_OUT};
use trcc_core::{DeviceError, DeviceProtocol, HandshakeResult, ProtocolKind, Result, TransportError};

use crate::consts;

const PROTOCOL: &str = ProtocolKind::HidLcdType3.name();

const INIT_PREFIX: [u8; 8] = [0xF5, 0x00, 0x01, 0x00, 0xBC, 0xFF, 0xB6, 0xC8];
const FRAME_PREFIX: [u8; 8] = [0xF5, 0x01, 0x01, 0x00, 0xBC, 0xFF, 0xB6, 0xC8];
pub const HEADER_SIZE: usize = 16;
pub const RESPONSE_SIZE: usize = 1024;
/// Payload of every frame write, one 320x320 RGB565 image
pub const DATA_SIZE: usize = 204_800;
pub const ACK_SIZE: usize = 16;
const MIN_RESPONSE: usize = 14;

pub fn init_packet() -> Vec<u8> {
    let mut packet = vec![0u8; HEADER_SIZE + RESPONSE_SIZE];
    packet[..8].copy_from_slice(&INIT_PREFIX);
    packet[12..16].copy_from_slice(&(RESPONSE_SIZE as u32).to_le_bytes());
    packet
}

pub fn validate(resp: &[u8]) -> std::result::Result<(), String> {
    if resp.len() < MIN_RESPONSE {
        return Err(format!("response too short ({} bytes)", resp.len()));
    }
    if hid_letter_to_resolution(resp[0]).is_none() {
        return Err(format!("unknown resolution code {:#04x}", resp[0]));
    }
    Ok(())
}

/// Decode a validated response; the letter code doubles as PM
pub fn parse(resp: &[u8]) -> HandshakeResult {
    let code = resp[0];
    let resolution = hid_letter_to_resolution(code).unwrap_or(DEFAULT_RESOLUTION);
    HandshakeResult {
        serial: Some(hex(&resp[10..14])),
        ..HandshakeResult::panel(code, 0, resolution)
    }
}

/// Header plus the payload padded or truncated to [`DATA_SIZE`]
pub fn frame_packet(payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(HEADER_SIZE + DATA_SIZE);
    packet.extend_from_slice(&FRAME_PREFIX);
    packet.extend_from_slice(&[0u8; 4]);
    packet.extend_from_slice(&(DATA_SIZE as u32).to_le_bytes());
    packet.extend_from_slice(&payload[..payload.len().min(DATA_SIZE)]);
    packet.resize(HEADER_SIZE + DATA_SIZE, 0);
    packet
}

pub struct HidLcdType3 {
    transport: Box<dyn Transport>,
    sleep: SharedSleep,
    session: Option<HandshakeResult>,
}

impl HidLcdType3 {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            sleep: thread_sleep(),
            session: None,
        }
    }

    pub fn with_sleep(mut self, sleep: SharedSleep) -> Self {
        self.sleep = sleep;
        self
    }

    fn write_frame(&mut self, payload: &[u8], stage: &'static str) -> Result<()> {
        if self.session.is_none() {
            return Err(DeviceError::HandshakeRequired {
                protocol: PROTOCOL,
                stage,
            });
        }
        write_all(
            &mut *self.transport,
            EP_OUT,
            &frame_packet(payload),
            consts::FRAME_TIMEOUT,
        )
        .map_err(|e| e.at(PROTOCOL, stage))?;

        let ack = self
            .transport
            .read(EP_IN, ACK_SIZE, consts::FRAME_TIMEOUT)
            .map_err(|e| e.at(PROTOCOL, "ack"))?;
        if ack.is_empty() {
            return Err(TransportError::ShortTransfer {
                expected: ACK_SIZE,
                actual: 0,
            }
            .at(PROTOCOL, "ack"));
        }
        Ok(())
    }
}

impl DeviceProtocol for HidLcdType3 {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::HidLcdType3
    }

    fn handshake(&mut self) -> Result<HandshakeResult> {
        self.transport
            .open()
            .map_err(|e| e.at(PROTOCOL, "open"))?;
        let resp = Exchange::HID.run(
            PROTOCOL,
            &mut *self.transport,
            &*self.sleep,
            &init_packet(),
            RESPONSE_SIZE,
            validate,
        )?;
        let result = parse(&resp);
        debug!(code = result.pm, geometry = ?result.geometry, "type 3 handshake complete");
        self.session = Some(result.clone());
        Ok(result)
    }

    fn send_frame(&mut self, data: &[u8]) -> Result<()> {
        self.write_frame(data, "frame")
    }

    fn clear(&mut self) -> Result<()> {
        // RGB565 black is all zero bytes in either byte order
        self.write_frame(&[], "clear")
    }

    fn close(&mut self) {
        self.transport.close();
        self.session = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use trcc_core::mock::{Fault, MockTransport, RecordingSleep};

    use super::*;

    fn response(code: u8) -> Vec<u8> {
        let mut resp = vec![0u8; RESPONSE_SIZE];
        resp[0] = code;
        resp[10..14].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        resp
    }

    fn lcd(mock: &MockTransport) -> HidLcdType3 {
        HidLcdType3::new(mock.clone()).with_sleep(Arc::new(RecordingSleep::new()))
    }

    #[test]
    fn init_packet_layout() {
        let packet = init_packet();
        assert_eq!(packet.len(), 1040);
        assert_eq!(
            &packet[..16],
            &[0xF5, 0x00, 0x01, 0x00, 0xBC, 0xFF, 0xB6, 0xC8, 0, 0, 0, 0, 0x00, 0x04, 0x00, 0x00]
        );
        assert!(packet[16..].iter().all(|&b| b == 0));
    }

    #[test]
    fn frame_header_and_fixed_size() {
        let packet = frame_packet(&[7; 10]);
        assert_eq!(packet.len(), HEADER_SIZE + DATA_SIZE);
        assert_eq!(
            &packet[..16],
            &[0xF5, 0x01, 0x01, 0x00, 0xBC, 0xFF, 0xB6, 0xC8, 0, 0, 0, 0, 0x00, 0x20, 0x03, 0x00]
        );
        assert_eq!(&packet[16..26], &[7; 10]);
        assert!(packet[26..].iter().all(|&b| b == 0));

        let oversized = frame_packet(&vec![1; DATA_SIZE + 100]);
        assert_eq!(oversized.len(), HEADER_SIZE + DATA_SIZE);
    }

    #[test]
    fn handshake_reads_code_and_serial() {
        let mock = MockTransport::new();
        mock.push_read(response(b'e'));
        let mut lcd = lcd(&mock);

        let result = lcd.handshake().unwrap();
        assert_eq!(result.pm, b'e');
        assert_eq!(result.resolution(), Some((320, 320)));
        assert_eq!(result.serial.as_deref(), Some("DEADBEEF"));
        assert_eq!(mock.writes()[0].data, init_packet());
    }

    #[test]
    fn code_f_is_accepted() {
        // Newer firmware, resolution not yet confirmed on hardware
        let mock = MockTransport::new();
        mock.push_read(response(b'f'));
        let result = lcd(&mock).handshake().unwrap();
        assert_eq!(result.resolution(), Some((320, 320)));
    }

    #[test]
    fn unknown_code_fails() {
        let mock = MockTransport::new();
        for _ in 0..3 {
            mock.push_read(response(b'z'));
        }
        let err = lcd(&mock).handshake().unwrap_err();
        assert!(matches!(err, DeviceError::HandshakeFailed { .. }));
    }

    #[test]
    fn silent_device_fails_handshake() {
        let mock = MockTransport::new();
        let err = lcd(&mock).handshake().unwrap_err();
        assert!(matches!(err, DeviceError::HandshakeFailed { .. }), "{err}");
        assert_eq!(mock.writes().len(), 3);
    }

    #[test]
    fn frame_is_one_write_then_ack() {
        let mock = MockTransport::new();
        mock.push_read(response(b'e')).push_read([0u8; ACK_SIZE]);
        let mut lcd = lcd(&mock);
        lcd.handshake().unwrap();

        lcd.send_frame(&vec![0xAA; DATA_SIZE]).unwrap();
        let writes = mock.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[1].data.len(), HEADER_SIZE + DATA_SIZE);
        assert_eq!(mock.pending_reads(), 0);
    }

    #[test]
    fn missing_ack_is_transport_error() {
        let mock = MockTransport::new();
        mock.push_read(response(b'e'))
            .push_read_fault(Fault::Timeout);
        let mut lcd = lcd(&mock);
        lcd.handshake().unwrap();
        let err = lcd.send_frame(&[0; 4]).unwrap_err();
        assert!(matches!(err, DeviceError::Transport { stage: "ack", .. }));
    }
}
