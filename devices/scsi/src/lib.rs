//! SCSI generic pass-through driver for USBLCD panels.
//!
//! These panels enumerate as USB mass storage and take vendor commands through raw CDBs.
//! A session is: poll (retrying while the firmware reports its boot sentinel), one init
//! write, then any number of frames, each sent as 64 KiB chunks with no acknowledgement.

use std::path::PathBuf;

use tracing::{debug, info, warn};
use trcc_core::frame::frame_len;
use trcc_core::resolution::{letter_to_resolution, DEFAULT_RESOLUTION};
use trcc_core::timing::{thread_sleep, SharedSleep};
use trcc_core::{DeviceError, DeviceProtocol, HandshakeResult, ProtocolKind, Result, TransportError};

pub mod cdb;
#[cfg(any(test, feature = "testutils"))]
pub mod mock;
#[cfg(target_os = "linux")]
pub mod sg;

pub mod consts {
    use std::time::Duration;

    /// Size of poll responses, init and clear payloads
    pub const IO_SIZE: usize = 0xE100;
    /// Frame chunk size
    pub const CHUNK_SIZE: usize = 0x10000;
    /// Poll response bytes 4..8 while the display controller is still booting
    pub const BOOT_SENTINEL: [u8; 4] = [0xA1, 0xA2, 0xA3, 0xA4];
    pub const BOOT_WAIT: Duration = Duration::from_secs(3);
    pub const BOOT_ATTEMPTS: u32 = 5;
    /// Settle time between init and the first frame
    pub const POST_INIT_DELAY: Duration = Duration::from_millis(100);
    pub const IO_TIMEOUT: Duration = Duration::from_secs(10);

    pub const THERMALRIGHT_VENDOR_ID: u16 = 0x87CD;
    pub const THERMALRIGHT_PRODUCT_ID: u16 = 0x70DB;
    pub const WINBOND_VENDOR_ID: u16 = 0x0416;
    pub const WINBOND_PRODUCT_ID: u16 = 0x5406;
    pub const ALI_VENDOR_ID: u16 = 0x0402;
    pub const ALI_PRODUCT_ID: u16 = 0x3922;

    /// sysfs vendor string of every USBLCD node
    pub const SYSFS_VENDOR: &str = "USBLCD";
}

const PROTOCOL: &str = ProtocolKind::Scsi.name();

/// CDB level pass-through
pub trait ScsiTransport: Send {
    fn open(&mut self) -> std::result::Result<(), TransportError>;
    fn close(&mut self);
    /// Data-in command
    fn read(&mut self, cdb: &[u8; 16], len: usize) -> std::result::Result<Vec<u8>, TransportError>;
    /// Data-out command
    fn write(&mut self, cdb: &[u8; 16], data: &[u8]) -> std::result::Result<(), TransportError>;
}

impl<T: ScsiTransport + ?Sized> ScsiTransport for Box<T> {
    fn open(&mut self) -> std::result::Result<(), TransportError> {
        (**self).open()
    }
    fn close(&mut self) {
        (**self).close()
    }
    fn read(&mut self, cdb: &[u8; 16], len: usize) -> std::result::Result<Vec<u8>, TransportError> {
        (**self).read(cdb, len)
    }
    fn write(&mut self, cdb: &[u8; 16], data: &[u8]) -> std::result::Result<(), TransportError> {
        (**self).write(cdb, data)
    }
}

/// Stand-in where the OS has no sg pass-through
#[cfg(not(target_os = "linux"))]
struct NoPassThrough;

#[cfg(not(target_os = "linux"))]
impl ScsiTransport for NoPassThrough {
    fn open(&mut self) -> std::result::Result<(), TransportError> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "scsi pass-through is only available on linux",
        )
        .into())
    }
    fn close(&mut self) {}
    fn read(&mut self, _: &[u8; 16], _: usize) -> std::result::Result<Vec<u8>, TransportError> {
        Err(TransportError::NotOpen)
    }
    fn write(&mut self, _: &[u8; 16], _: &[u8]) -> std::result::Result<(), TransportError> {
        Err(TransportError::NotOpen)
    }
}

/// SCSI LCD session
pub struct ScsiLcd {
    transport: Box<dyn ScsiTransport>,
    sleep: SharedSleep,
    session: Option<HandshakeResult>,
}

impl ScsiLcd {
    pub fn new(transport: impl ScsiTransport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            sleep: thread_sleep(),
            session: None,
        }
    }

    /// Session on a `/dev/sgN` node. Nothing is opened until the handshake.
    pub fn for_node(path: impl Into<PathBuf>) -> Self {
        #[cfg(target_os = "linux")]
        {
            Self::new(sg::SgTransport::new(path))
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = path.into();
            Self::new(NoPassThrough)
        }
    }

    pub fn with_sleep(mut self, sleep: SharedSleep) -> Self {
        self.sleep = sleep;
        self
    }

    /// Poll until the boot sentinel clears
    fn poll(&mut self) -> Result<Vec<u8>> {
        for attempt in 1..=consts::BOOT_ATTEMPTS {
            let response = self
                .transport
                .read(&cdb::poll(), consts::IO_SIZE)
                .map_err(|e| e.at(PROTOCOL, "poll"))?;
            if response.get(4..8) != Some(&consts::BOOT_SENTINEL[..]) {
                return Ok(response);
            }
            info!(
                attempt,
                max = consts::BOOT_ATTEMPTS,
                "display controller still booting"
            );
            if attempt < consts::BOOT_ATTEMPTS {
                self.sleep.sleep(consts::BOOT_WAIT);
            }
        }
        Err(DeviceError::DeviceNotReady {
            protocol: PROTOCOL,
            attempts: consts::BOOT_ATTEMPTS,
        })
    }

    fn resolution(&self, stage: &'static str) -> Result<(u32, u32)> {
        self.session
            .as_ref()
            .and_then(HandshakeResult::resolution)
            .ok_or(DeviceError::HandshakeRequired {
                protocol: PROTOCOL,
                stage,
            })
    }
}

impl DeviceProtocol for ScsiLcd {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Scsi
    }

    fn handshake(&mut self) -> Result<HandshakeResult> {
        // Init must go out once per session, never again before frames
        if let Some(result) = &self.session {
            return Ok(result.clone());
        }
        self.transport
            .open()
            .map_err(|e| e.at(PROTOCOL, "open"))?;

        let response = self.poll()?;
        let code = *response
            .first()
            .ok_or_else(|| DeviceError::handshake(PROTOCOL, "empty poll response"))?;
        let resolution = letter_to_resolution(code).unwrap_or_else(|| {
            warn!(code, "unknown resolution code, assuming 320x320");
            DEFAULT_RESOLUTION
        });

        self.transport
            .write(&cdb::init(), &[0u8; consts::IO_SIZE])
            .map_err(|e| e.at(PROTOCOL, "init"))?;
        self.sleep.sleep(consts::POST_INIT_DELAY);

        debug!(code, ?resolution, "scsi handshake complete");
        let result = HandshakeResult::panel(code, 0, resolution);
        self.session = Some(result.clone());
        Ok(result)
    }

    fn send_frame(&mut self, data: &[u8]) -> Result<()> {
        let resolution = self.resolution("frame")?;
        let total = frame_len(resolution);
        if data.len() > total {
            return Err(DeviceError::InvalidFrame {
                expected: total,
                actual: data.len(),
            });
        }
        let padded;
        let data = if data.len() < total {
            let mut buf = data.to_vec();
            buf.resize(total, 0);
            padded = buf;
            &padded[..]
        } else {
            data
        };

        for chunk in cdb::chunks(total) {
            self.transport
                .write(
                    &cdb::cdb(chunk.cmd, chunk.len as u32),
                    &data[chunk.offset..chunk.offset + chunk.len],
                )
                .map_err(|e| e.at(PROTOCOL, "frame"))?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.resolution("clear")?;
        self.transport
            .write(&cdb::clear(), &[0u8; consts::IO_SIZE])
            .map_err(|e| e.at(PROTOCOL, "clear"))
    }

    fn close(&mut self) {
        self.transport.close();
        self.session = None;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use trcc_core::mock::{Fault, RecordingSleep};

    use super::mock::MockScsi;
    use super::*;

    fn poll_response(code: u8, booting: bool) -> Vec<u8> {
        let mut resp = vec![0u8; consts::IO_SIZE];
        resp[0] = code;
        if booting {
            resp[4..8].copy_from_slice(&consts::BOOT_SENTINEL);
        }
        resp
    }

    fn lcd(mock: &MockScsi) -> (ScsiLcd, RecordingSleep) {
        let sleep = RecordingSleep::new();
        let lcd = ScsiLcd::new(mock.clone()).with_sleep(std::sync::Arc::new(sleep.clone()));
        (lcd, sleep)
    }

    #[test]
    fn handshake_resolves_and_inits_once() {
        let mock = MockScsi::new();
        mock.push_read(poll_response(b'e', false));
        let (mut lcd, sleep) = lcd(&mock);

        let result = lcd.handshake().unwrap();
        assert_eq!(result.resolution(), Some((320, 320)));
        assert_eq!(mock.reads(), 1);
        assert!(!sleep.slept().contains(&consts::BOOT_WAIT));

        // A second handshake in the same session must not re-init
        lcd.handshake().unwrap();
        let writes = mock.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].cdb, cdb::init());
        assert_eq!(writes[0].data.len(), consts::IO_SIZE);
        assert!(writes[0].data.iter().all(|&b| b == 0));
    }

    #[test]
    fn type3_only_code_falls_back_to_default() {
        let mock = MockScsi::new();
        mock.push_read(poll_response(b'f', false));
        let (mut lcd, _) = lcd(&mock);

        let result = lcd.handshake().unwrap();
        assert_eq!(result.resolution(), Some(DEFAULT_RESOLUTION));
        assert_eq!(result.pm, b'f');
        assert_eq!(mock.writes()[0].cdb, cdb::init());
    }

    #[test]
    fn boot_sentinel_retries_then_succeeds() {
        let mock = MockScsi::new();
        mock.push_read(poll_response(b'$', true))
            .push_read(poll_response(b'$', true))
            .push_read(poll_response(b'$', false));
        let (mut lcd, sleep) = lcd(&mock);

        let result = lcd.handshake().unwrap();
        assert_eq!(result.resolution(), Some((240, 240)));
        assert_eq!(mock.reads(), 3);
        assert_eq!(
            sleep.slept(),
            vec![consts::BOOT_WAIT, consts::BOOT_WAIT, consts::POST_INIT_DELAY]
        );
    }

    #[test]
    fn boot_sentinel_exhausts_attempts() {
        let mock = MockScsi::new();
        for _ in 0..consts::BOOT_ATTEMPTS {
            mock.push_read(poll_response(b'd', true));
        }
        let (mut lcd, sleep) = lcd(&mock);

        let err = lcd.handshake().unwrap_err();
        assert!(matches!(
            err,
            DeviceError::DeviceNotReady {
                attempts: consts::BOOT_ATTEMPTS,
                ..
            }
        ));
        assert_eq!(sleep.total(), Duration::from_secs(3 * 4));
        // No init after a failed poll
        assert!(mock.writes().is_empty());
    }

    #[test]
    fn frame_is_chunked_without_reinit() {
        let mock = MockScsi::new();
        mock.push_read(poll_response(b'd', false));
        let (mut lcd, _) = lcd(&mock);
        lcd.handshake().unwrap();

        let frame: Vec<u8> = (0..320 * 320 * 2).map(|i| i as u8).collect();
        lcd.send_frame(&frame).unwrap();
        lcd.send_frame(&frame).unwrap();

        let writes = mock.writes();
        // init + 2 frames of 4 chunks
        assert_eq!(writes.len(), 9);
        let first = &writes[1..5];
        let sizes: Vec<_> = first.iter().map(|w| w.data.len()).collect();
        assert_eq!(sizes, [65536, 65536, 65536, 8192]);
        for (i, w) in first.iter().enumerate() {
            assert_eq!(&w.cdb[..4], &[0xF5, 0x01, 0x01, i as u8]);
            assert_eq!(&w.cdb[12..16], &(w.data.len() as u32).to_le_bytes());
        }
        assert_eq!(first[3].data, &frame[3 * 65536..]);
        assert!(writes[5..].iter().all(|w| w.cdb != cdb::init()));
    }

    #[test]
    fn short_frame_is_zero_padded() {
        let mock = MockScsi::new();
        mock.push_read(poll_response(b'$', false));
        let (mut lcd, _) = lcd(&mock);
        lcd.handshake().unwrap();
        lcd.send_frame(&[0xFF; 10]).unwrap();
        let writes = mock.writes();
        let data = &writes[1].data;
        assert_eq!(data.len(), 240 * 240 * 2);
        assert_eq!(&data[..10], &[0xFF; 10]);
        assert!(data[10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn frame_before_handshake_is_refused() {
        let mock = MockScsi::new();
        let (mut lcd, _) = lcd(&mock);
        assert!(matches!(
            lcd.send_frame(&[0; 4]),
            Err(DeviceError::HandshakeRequired { .. })
        ));
        assert!(mock.writes().is_empty());
    }

    #[test]
    fn unplug_mid_frame_is_transport_error() {
        let mock = MockScsi::new();
        mock.push_read(poll_response(b'e', false));
        let (mut lcd, _) = lcd(&mock);
        lcd.handshake().unwrap();
        // init was write 0, fail the second chunk
        mock.fail_write(2, Fault::NoDevice);
        let err = lcd.send_frame(&vec![0; 320 * 320 * 2]).unwrap_err();
        assert!(matches!(err, DeviceError::Transport { stage: "frame", .. }));
    }

    #[test]
    fn clear_sends_mode_4() {
        let mock = MockScsi::new();
        mock.push_read(poll_response(b'2', false));
        let (mut lcd, _) = lcd(&mock);
        assert_eq!(lcd.handshake().unwrap().resolution(), Some((320, 240)));
        lcd.clear().unwrap();
        let last = mock.writes().pop().unwrap();
        assert_eq!(&last.cdb[..4], &[0xF5, 0x01, 0x04, 0x00]);
        assert_eq!(last.data, vec![0u8; consts::IO_SIZE]);
    }

    #[test]
    fn close_starts_a_new_session() {
        let mock = MockScsi::new();
        mock.push_read(poll_response(b'e', false))
            .push_read(poll_response(b'e', false));
        let (mut lcd, _) = lcd(&mock);
        lcd.handshake().unwrap();
        lcd.close();
        assert!(!mock.is_open());
        lcd.handshake().unwrap();
        let inits = mock.writes().iter().filter(|w| w.cdb == cdb::init()).count();
        assert_eq!(inits, 2);
    }
}
