//! HID RGB LED controllers (`0416:8001`).
//!
//! The firmware answers the identification packet once per power cycle; later attempts get
//! no reply. Callers keep the first result in the probe cache and hand it back through
//! [`DeviceProtocol::restore`] instead of handshaking again.

use tracing::{debug, trace};
use trcc_core::handshake::Exchange;
use trcc_core::timing::{thread_sleep, SharedSleep};
use trcc_core::transport::{write_all, Transport, EP_OUT};
use trcc_core::{
    DeviceError, DeviceProtocol, Geometry, HandshakeResult, HasLeds, LedTopology, ProtocolKind,
    Result, Rgb,
};

pub mod effects;
pub mod packet;
pub mod remap;
pub mod segment;
pub mod styles;

pub use effects::{LedEngine, LedMode, PRESET_COLORS};
pub use segment::{Reading, Sensor, TempUnit};

pub mod consts {
    use std::time::Duration;

    pub const VENDOR_ID: u16 = 0x0416;
    pub const PRODUCT_ID: u16 = 0x8001;
    /// Minimum gap between two colour packets
    pub const SEND_COOLDOWN: Duration = Duration::from_millis(30);
    pub const WRITE_TIMEOUT: Duration = Duration::from_millis(100);
    pub const MAX_BRIGHTNESS: u8 = 100;
}

const PROTOCOL: &str = ProtocolKind::HidLed.name();
const SUCCESS: u8 = 0x01;
/// Response must reach the status byte
const MIN_RESPONSE: usize = 13;

pub fn validate(resp: &[u8]) -> std::result::Result<(), String> {
    if resp.len() < MIN_RESPONSE {
        return Err(format!("response too short ({} bytes)", resp.len()));
    }
    if resp[..4] != packet::MAGIC {
        return Err(format!("bad magic {:02x?}", &resp[..4]));
    }
    if resp[12] != SUCCESS {
        return Err(format!("status {:#04x}", resp[12]));
    }
    Ok(())
}

/// PM at offset 6, SUB at offset 5
pub fn parse(resp: &[u8]) -> HandshakeResult {
    let pm = resp[6];
    let sub = resp[5];
    let (topology, model) = styles::identify(pm, sub);
    HandshakeResult {
        pm,
        sub,
        geometry: Geometry::Leds(topology),
        model: Some(model),
        serial: None,
        valid: true,
    }
}

pub struct HidLed {
    transport: Box<dyn Transport>,
    sleep: SharedSleep,
    session: Option<HandshakeResult>,
}

impl HidLed {
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

    fn session_topology(&self, stage: &'static str) -> Result<LedTopology> {
        self.session
            .as_ref()
            .and_then(HandshakeResult::topology)
            .copied()
            .ok_or(DeviceError::HandshakeRequired {
                protocol: PROTOCOL,
                stage,
            })
    }

    /// Send one packet as 64-byte reports, then wait out the cooldown
    fn send_packet(&mut self, packet: &[u8], stage: &'static str) -> Result<()> {
        self.transport
            .open()
            .map_err(|e| e.at(PROTOCOL, "open"))?;
        for report in packet::reports(packet) {
            write_all(&mut *self.transport, EP_OUT, &report, consts::WRITE_TIMEOUT)
                .map_err(|e| e.at(PROTOCOL, stage))?;
        }
        trace!(bytes = packet.len(), "led packet sent");
        self.sleep.sleep(consts::SEND_COOLDOWN);
        Ok(())
    }
}

impl HasLeds for HidLed {
    fn send_colors(&mut self, colors: &[Rgb], brightness: u8) -> Result<()> {
        let topology = self.session_topology("frame")?;
        let logical = remap::spread(colors, remap::logical_len(&topology));
        let wire = remap::to_wire(&logical, &topology)?;
        let packet = packet::data_packet(&wire, brightness.min(consts::MAX_BRIGHTNESS));
        self.send_packet(&packet, "frame")
    }

    fn topology(&self) -> Option<LedTopology> {
        self.session
            .as_ref()
            .and_then(HandshakeResult::topology)
            .copied()
    }
}

impl DeviceProtocol for HidLed {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::HidLed
    }

    fn handshake(&mut self) -> Result<HandshakeResult> {
        self.transport
            .open()
            .map_err(|e| e.at(PROTOCOL, "open"))?;
        let resp = Exchange::HID.run(
            PROTOCOL,
            &mut *self.transport,
            &*self.sleep,
            &packet::init_packet(),
            packet::REPORT_SIZE,
            validate,
        )?;
        let result = parse(&resp);
        debug!(
            pm = result.pm,
            sub = result.sub,
            model = result.model.as_deref().unwrap_or_default(),
            "led handshake complete"
        );
        self.session = Some(result.clone());
        Ok(result)
    }

    /// Packed RGB triplets in logical order, at full brightness
    fn send_frame(&mut self, data: &[u8]) -> Result<()> {
        if data.len() % 3 != 0 {
            return Err(DeviceError::InvalidFrame {
                expected: data.len() / 3 * 3,
                actual: data.len(),
            });
        }
        let colors: Vec<Rgb> = data.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
        self.send_colors(&colors, consts::MAX_BRIGHTNESS)
    }

    fn clear(&mut self) -> Result<()> {
        let topology = self.session_topology("clear")?;
        let black = vec![[0, 0, 0]; topology.led_count];
        let wire = remap::to_wire(&black, &topology)?;
        self.send_packet(&packet::data_packet(&wire, 0), "clear")
    }

    fn restore(&mut self, result: &HandshakeResult) -> Result<()> {
        if result.topology().is_none() {
            return Err(DeviceError::ProtocolMismatch(format!(
                "cached result for pm {} is not an LED topology",
                result.pm
            )));
        }
        debug!(pm = result.pm, sub = result.sub, "led session restored from cache");
        self.session = Some(result.clone());
        Ok(())
    }

    fn as_leds(&mut self) -> Option<&mut dyn HasLeds> {
        Some(self)
    }

    fn close(&mut self) {
        self.transport.close();
        self.session = None;
    }
}
