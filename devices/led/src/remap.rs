//! Logical LED index to physical wire position tables.
//!
//! Entry `i` of a table is the logical LED whose colour goes out at wire position `i`.
//! Logical indices past the end of the caller's colour list are sent black.

use trcc_core::{DeviceError, LedTopology, Result, Rgb};

const PROTOCOL: &str = trcc_core::ProtocolKind::HidLed.name();

/// PA120_DIGITAL, 84 LEDs
#[rustfmt::skip]
const STYLE_2: [usize; 84] = [
    // cpu2 cpu1, zone 1: F A B G E D C
    3, 2, 14, 9, 10, 15, 13, 12, 11,
    21, 16, 17, 22, 20, 19, 18,
    28, 23, 24, 29, 27, 26, 25,
    36, 31, 32, 37, 35, 34, 33,
    43, 38, 39, 44, 42, 41, 40,
    // bfb bfb1
    8, 8,
    // zones 10 and 9 run reversed: C D E G B A F
    75, 76, 77, 79, 74, 73, 78,
    68, 69, 70, 72, 67, 66, 71,
    // b12 c12 ssd1 hsd1
    82, 83, 6, 7,
    61, 62, 63, 65, 60, 59, 64,
    54, 55, 56, 58, 53, 52, 57,
    47, 48, 49, 51, 46, 45, 50,
    // gpu1 gpu2 ssd hsd c11 b11
    4, 5, 6, 7, 81, 80,
];

/// AK120_DIGITAL, 64 LEDs
#[rustfmt::skip]
const STYLE_3: [usize; 64] = [
    // watt, zone 3: C D E G B A F
    1, 25, 26, 27, 29, 24, 23, 28,
    // b2 cpu1, zone 2: A F G C D E
    17, 2, 16, 21, 22, 18, 19, 20,
    10, 9, 14, 15, 11, 12, 13,
    36, 31, 32, 37, 35, 34, 33,
    43, 38, 39, 44, 42, 41, 40,
    50, 45, 46, 51, 49, 48, 47,
    // ssd hsd bfb
    6, 7, 8,
    61, 62, 63, 65, 60, 59, 64,
    // c7 gpu1, zone 7: D E G B A F
    54, 4, 55, 56, 58, 53, 52, 57,
    // b9 c9
    67, 68,
];

/// LC1 and HR10 2280 Pro, 31 LEDs
#[rustfmt::skip]
const STYLE_4: [usize; 31] = [
    // gno mtno, zone 4: C D E G B A, ssd
    2, 1, 33, 34, 35, 37, 32, 31, 6,
    // f4, zone 3: C D E G B A F
    36, 25, 26, 27, 29, 24, 23, 28,
    18, 19, 20, 22, 17, 16, 21,
    11, 12, 13, 15, 10, 9, 14,
];

/// Wire table for a style, if its wiring is known
pub fn table(style_id: u8) -> Option<&'static [usize]> {
    match style_id {
        2 => Some(&STYLE_2),
        3 => Some(&STYLE_3),
        4 | 13 => Some(&STYLE_4),
        _ => None,
    }
}

/// Size of the logical index space the wire table reads from
pub fn logical_len(topology: &LedTopology) -> usize {
    table(topology.style_id)
        .and_then(|t| t.iter().max())
        .map_or(topology.led_count, |&max| max + 1)
}

/// Stretch segment colours over `len` logical LEDs, each LED taking its proportional
/// segment. Lists that already cover `len` are returned as-is.
pub fn spread(colors: &[Rgb], len: usize) -> Vec<Rgb> {
    if colors.is_empty() || colors.len() >= len {
        return colors.to_vec();
    }
    (0..len).map(|i| colors[i * colors.len() / len]).collect()
}

/// Reorder logical colours into wire order.
///
/// Single-zone controllers without a table take colours as-is. Multi-zone controllers
/// without a table are refused rather than lit in a guessed order.
pub fn to_wire(colors: &[Rgb], topology: &LedTopology) -> Result<Vec<Rgb>> {
    match table(topology.style_id) {
        Some(table) => Ok(table
            .iter()
            .map(|&i| colors.get(i).copied().unwrap_or([0, 0, 0]))
            .collect()),
        None if topology.zone_count == 1 => Ok(colors.to_vec()),
        None => Err(DeviceError::Unsupported {
            protocol: PROTOCOL,
            what: format!(
                "wire order of LED style {} ({} zones)",
                topology.style_id, topology.zone_count
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::styles::{style, STYLES};

    #[test]
    fn tables_cover_every_led() {
        for s in STYLES {
            if let Some(table) = table(s.id) {
                assert_eq!(table.len(), s.led_count, "style {}", s.id);
            }
        }
    }

    #[test]
    fn lc1_wire_order() {
        let colors: Vec<Rgb> = (0..40u8).map(|i| [i, 0, 0]).collect();
        let topology = style(4).unwrap().topology();
        let wire = to_wire(&colors, &topology).unwrap();
        assert_eq!(wire.len(), 31);
        assert_eq!(wire[0], [2, 0, 0]);
        assert_eq!(wire[1], [1, 0, 0]);
        assert_eq!(wire[30], [14, 0, 0]);
        // HR10 shares the LC1 board
        assert_eq!(to_wire(&colors, &style(13).unwrap().topology()).unwrap(), wire);
    }

    #[test]
    fn short_colour_list_pads_black() {
        let topology = style(4).unwrap().topology();
        let wire = to_wire(&[[9, 9, 9]; 14], &topology).unwrap();
        // Wire position 2 reads logical LED 33
        assert_eq!(wire[2], [0, 0, 0]);
        assert_eq!(wire[1], [9, 9, 9]);
    }

    #[test]
    fn segments_spread_over_leds() {
        let leds = spread(&[[1, 0, 0], [2, 0, 0]], 5);
        assert_eq!(leds, vec![[1, 0, 0], [1, 0, 0], [1, 0, 0], [2, 0, 0], [2, 0, 0]]);
        assert_eq!(spread(&[[7; 3]; 4], 2).len(), 4);
        assert!(spread(&[], 3).is_empty());
    }

    #[test]
    fn logical_space_follows_table() {
        assert_eq!(logical_len(&style(4).unwrap().topology()), 38);
        assert_eq!(logical_len(&style(2).unwrap().topology()), 84);
        assert_eq!(logical_len(&style(1).unwrap().topology()), 30);
    }

    #[test]
    fn single_zone_without_table_is_identity() {
        let topology = style(1).unwrap().topology();
        let colors = [[1, 2, 3]; 10];
        assert_eq!(to_wire(&colors, &topology).unwrap(), colors.to_vec());
    }

    #[test]
    fn multi_zone_without_table_is_refused() {
        for id in [5, 6, 7, 8, 11] {
            let topology = style(id).unwrap().topology();
            assert!(
                matches!(
                    to_wire(&[[0; 3]; 4], &topology),
                    Err(DeviceError::Unsupported { .. })
                ),
                "style {id}"
            );
        }
    }
}
