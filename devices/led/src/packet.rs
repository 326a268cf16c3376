//! LED wire packets.
//!
//! ```text
//! 0..4    DA DB DC DD
//! 12      command (1 = identify, 2 = colours)
//! 16..18  payload length, u16 LE
//! 20..    RGB triplets in wire order
//! ```
//! The whole packet goes out as 64-byte reports, the last one zero padded.

use trcc_core::Rgb;

pub const MAGIC: [u8; 4] = [0xDA, 0xDB, 0xDC, 0xDD];
pub const HEADER_SIZE: usize = 20;
pub const REPORT_SIZE: usize = 64;
pub const CMD_INIT: u8 = 0x01;
pub const CMD_DATA: u8 = 0x02;

/// Identification packet, one report
pub fn init_packet() -> [u8; REPORT_SIZE] {
    let mut packet = [0u8; REPORT_SIZE];
    packet[..4].copy_from_slice(&MAGIC);
    packet[12] = CMD_INIT;
    packet
}

pub fn header(payload_len: u16) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[..4].copy_from_slice(&MAGIC);
    header[12] = CMD_DATA;
    header[16..18].copy_from_slice(&payload_len.to_le_bytes());
    header
}

/// `floor(c * brightness/100 * 0.4)`, with brightness clamped to 100
#[inline]
pub fn scale(channel: u8, brightness: u8) -> u8 {
    let brightness = u32::from(brightness.min(100));
    // c * b/100 * 4/10, kept in integers so the floor is exact
    (u32::from(channel) * brightness * 4 / 1000) as u8
}

/// Header plus brightness scaled colours
pub fn data_packet(colors: &[Rgb], brightness: u8) -> Vec<u8> {
    let payload_len = colors.len() * 3;
    let mut packet = Vec::with_capacity(HEADER_SIZE + payload_len);
    packet.extend_from_slice(&header(payload_len as u16));
    packet.extend(
        colors
            .iter()
            .flat_map(|&rgb| rgb.map(|c| scale(c, brightness))),
    );
    packet
}

/// Split a packet into zero padded reports
pub fn reports(packet: &[u8]) -> impl Iterator<Item = [u8; REPORT_SIZE]> + '_ {
    packet.chunks(REPORT_SIZE).map(|chunk| {
        let mut report = [0u8; REPORT_SIZE];
        report[..chunk.len()].copy_from_slice(chunk);
        report
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn white_at_full_brightness_is_102() {
        assert_eq!(scale(255, 100), 102);
        let packet = data_packet(&[[255, 255, 255]], 100);
        assert_eq!(&packet[HEADER_SIZE..], &[102, 102, 102]);
    }

    #[test]
    fn brightness_is_clamped() {
        assert_eq!(scale(255, 250), 102);
        assert_eq!(scale(255, 0), 0);
        assert_eq!(scale(255, 50), 51);
        assert_eq!(scale(10, 100), 4);
    }

    #[test]
    fn header_layout() {
        let packet = data_packet(&[[1, 2, 3]; 30], 100);
        assert_eq!(&packet[..4], &MAGIC);
        assert_eq!(packet[12], CMD_DATA);
        assert_eq!(u16::from_le_bytes([packet[16], packet[17]]), 90);
        assert_eq!(packet.len(), HEADER_SIZE + 90);
    }

    #[test]
    fn reports_pad_the_tail() {
        let packet = data_packet(&[[255, 0, 0]; 30], 100);
        let reports: Vec<_> = reports(&packet).collect();
        // 110 bytes -> 2 reports
        assert_eq!(reports.len(), 2);
        assert_eq!(&reports[0][..], &packet[..64]);
        assert_eq!(&reports[1][..46], &packet[64..]);
        assert!(reports[1][46..].iter().all(|&b| b == 0));
    }

    #[test]
    fn init_packet_layout() {
        let packet = init_packet();
        assert_eq!(&packet[..4], &MAGIC);
        assert_eq!(packet[12], CMD_INIT);
        assert_eq!(packet.iter().filter(|&&b| b != 0).count(), 5);
    }

    proptest! {
        #[test]
        fn scaling_never_exceeds_forty_percent(c: u8, b in 0u8..=100) {
            let scaled = scale(c, b);
            prop_assert!(u32::from(scaled) * 1000 <= u32::from(c) * u32::from(b) * 4);
            prop_assert!(scaled <= 102);
        }
    }
}
