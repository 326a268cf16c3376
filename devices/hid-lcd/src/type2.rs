//! Type 2 ("H" variant): `DA DB DC DD` handshake, JPEG frames in 512-byte aligned writes.

use image::RgbImage;
use tracing::debug;
use trcc_core::frame::{encode_jpeg, FrameFormat, JPEG_QUALITY};
use trcc_core::handshake::{hex, Exchange};
use trcc_core::resolution::{fbl_to_resolution, pm_to_fbl};
use trcc_core::timing::{thread_sleep, SharedSleep};
use trcc_core::transport::{write_all, Transport, EP_OUT};
use trcc_core::{DeviceError, DeviceProtocol, HandshakeResult, ProtocolKind, Result};

use crate::consts;

const PROTOCOL: &str = ProtocolKind::HidLcdType2.name();

pub const MAGIC: [u8; 4] = [0xDA, 0xDB, 0xDC, 0xDD];
pub const PACKET_SIZE: usize = 512;
pub const HEADER_SIZE: usize = 20;
const CMD_INIT: u8 = 0x01;
const SUCCESS: u8 = 0x01;
/// Response byte 16 when a serial follows at 20..36
const SERIAL_PRESENT: u8 = 0x10;

/// Identification packet
pub fn init_packet() -> [u8; PACKET_SIZE] {
    let mut packet = [0u8; PACKET_SIZE];
    packet[..4].copy_from_slice(&MAGIC);
    packet[12] = CMD_INIT;
    packet
}

pub fn validate(resp: &[u8]) -> std::result::Result<(), String> {
    if resp.len() < HEADER_SIZE {
        return Err(format!("response too short ({} bytes)", resp.len()));
    }
    if resp[..4] != MAGIC {
        return Err(format!("bad magic {:02x?}", &resp[..4]));
    }
    if resp[12] != SUCCESS {
        return Err(format!("status {:#04x}", resp[12]));
    }
    Ok(())
}

/// Decode a validated response. PM and SUB sit swapped relative to the LED protocol.
pub fn parse(resp: &[u8]) -> HandshakeResult {
    let pm = resp[5];
    let sub = resp[4];
    let resolution = fbl_to_resolution(pm_to_fbl(pm, sub), pm);
    let serial = match resp.get(20..36) {
        Some(serial) if resp[16] == SERIAL_PRESENT => Some(hex(serial)),
        _ => None,
    };
    HandshakeResult {
        serial,
        ..HandshakeResult::panel(pm, sub, resolution)
    }
}

/// Round a transfer up to the endpoint's 512-byte granularity
pub const fn align_512(len: usize) -> usize {
    len.div_ceil(PACKET_SIZE) * PACKET_SIZE
}

/// Length-prefixed, zero-padded frame write
pub fn frame_packet(payload: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(align_512(HEADER_SIZE + payload.len()));
    packet.extend_from_slice(&[0u8; 16]);
    packet.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    packet.extend_from_slice(payload);
    packet.resize(align_512(packet.len()), 0);
    packet
}

pub struct HidLcdType2 {
    transport: Box<dyn Transport>,
    sleep: SharedSleep,
    session: Option<HandshakeResult>,
}

impl HidLcdType2 {
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
        let packet = frame_packet(payload);
        write_all(&mut *self.transport, EP_OUT, &packet, consts::FRAME_TIMEOUT)
            .map_err(|e| e.at(PROTOCOL, stage))?;
        self.sleep.sleep(consts::TYPE2_FRAME_DELAY);
        Ok(())
    }
}

impl DeviceProtocol for HidLcdType2 {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::HidLcdType2
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
            PACKET_SIZE,
            validate,
        )?;
        let result = parse(&resp);
        debug!(
            pm = result.pm,
            sub = result.sub,
            geometry = ?result.geometry,
            "type 2 handshake complete"
        );
        self.session = Some(result.clone());
        Ok(result)
    }

    fn send_frame(&mut self, data: &[u8]) -> Result<()> {
        self.write_frame(data, "frame")
    }

    fn frame_format(&self) -> FrameFormat {
        FrameFormat::Jpeg
    }

    fn clear(&mut self) -> Result<()> {
        let (width, height) = self
            .session
            .as_ref()
            .and_then(HandshakeResult::resolution)
            .ok_or(DeviceError::HandshakeRequired {
                protocol: PROTOCOL,
                stage: "clear",
            })?;
        let black = encode_jpeg(&RgbImage::new(width, height), JPEG_QUALITY)?;
        self.write_frame(&black, "clear")
    }

    fn close(&mut self) {
        self.transport.close();
        self.session = None;
    }
}
