//! Request/response handshake shared by the HID protocols.

use std::time::Duration;

use tracing::warn;

use crate::timing::Sleep;
use crate::transport::{write_all, Transport, EP_IN, EP_OUT};
use crate::{DeviceError, Result};

/// Timing of one identification exchange: wait, write, wait, read, validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exchange {
    pub attempts: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
    /// Before writing the identification packet
    pub pre_delay: Duration,
    /// Between the write and the response read
    pub post_delay: Duration,
}

impl Exchange {
    /// HID firmware sometimes drops the first packet after power-on
    pub const HID: Exchange = Exchange {
        attempts: 3,
        retry_delay: Duration::from_millis(500),
        timeout: Duration::from_millis(5000),
        pre_delay: Duration::from_millis(50),
        post_delay: Duration::from_millis(200),
    };

    /// Send `packet` and read a response that passes `validate`, retrying on failure.
    ///
    /// Permission errors are returned immediately. After the last attempt, a silent or
    /// malformed device is reported as [`DeviceError::HandshakeFailed`]; any other
    /// transport failure keeps its own variant.
    pub fn run(
        &self,
        protocol: &'static str,
        transport: &mut dyn Transport,
        sleep: &dyn Sleep,
        packet: &[u8],
        response_len: usize,
        validate: impl Fn(&[u8]) -> std::result::Result<(), String>,
    ) -> Result<Vec<u8>> {
        let mut last = DeviceError::handshake(protocol, "no attempts made");
        for attempt in 1..=self.attempts {
            sleep.sleep(self.pre_delay);
            let response = write_all(transport, EP_OUT, packet, self.timeout).and_then(|_| {
                sleep.sleep(self.post_delay);
                transport.read(EP_IN, response_len, self.timeout)
            });

            last = match response {
                Ok(resp) => match validate(&resp) {
                    Ok(()) => return Ok(resp),
                    Err(reason) => DeviceError::handshake(protocol, reason),
                },
                Err(e) if e.is_permission_denied() => return Err(e.at(protocol, "handshake")),
                Err(e) if e.is_timeout() => DeviceError::handshake(protocol, "no response"),
                Err(e) => e.at(protocol, "handshake"),
            };
            warn!(
                protocol,
                attempt,
                max = self.attempts,
                error = %last,
                "handshake attempt failed"
            );
            if attempt < self.attempts {
                sleep.sleep(self.retry_delay);
            }
        }
        Err(last)
    }
}

/// Uppercase hex, as the vendor tools print serials
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}
