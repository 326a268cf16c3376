//! LED device styles and the PM registry.
//!
//! The firmware only reports a product model byte (PM) and a sub-type byte (SUB); every
//! other property of the controller is looked up here.

use tracing::warn;
use trcc_core::LedTopology;

/// Physical layout of one LED product family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedStyle {
    pub id: u8,
    pub led_count: usize,
    pub segment_count: usize,
    pub zone_count: usize,
    pub model: &'static str,
}

impl LedStyle {
    const fn new(
        id: u8,
        led_count: usize,
        segment_count: usize,
        zone_count: usize,
        model: &'static str,
    ) -> Self {
        Self {
            id,
            led_count,
            segment_count,
            zone_count,
            model,
        }
    }

    pub const fn topology(&self) -> LedTopology {
        LedTopology {
            style_id: self.id,
            led_count: self.led_count,
            segment_count: self.segment_count,
            zone_count: self.zone_count,
        }
    }
}

pub const STYLES: [LedStyle; 13] = [
    LedStyle::new(1, 30, 10, 1, "AX120_DIGITAL"),
    LedStyle::new(2, 84, 18, 4, "PA120_DIGITAL"),
    LedStyle::new(3, 64, 10, 2, "AK120_DIGITAL"),
    LedStyle::new(4, 31, 14, 1, "LC1"),
    LedStyle::new(5, 93, 23, 2, "LF8"),
    LedStyle::new(6, 124, 72, 2, "LF12"),
    LedStyle::new(7, 116, 12, 3, "LF10"),
    LedStyle::new(8, 18, 13, 4, "CZ1"),
    LedStyle::new(9, 61, 31, 1, "LC2"),
    LedStyle::new(10, 38, 17, 1, "LF11"),
    LedStyle::new(11, 93, 72, 2, "LF15"),
    LedStyle::new(12, 62, 62, 1, "LF13"),
    // Same board as LC1, told apart by SUB 129
    LedStyle::new(13, 31, 14, 1, "HR10_2280_PRO_DIGITAL"),
];

pub fn style(id: u8) -> Option<&'static LedStyle> {
    STYLES.iter().find(|s| s.id == id)
}

/// Registry entry for one PM value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmEntry {
    pub style_id: u8,
    pub model: &'static str,
}

const fn entry(style_id: u8, model: &'static str) -> Option<PmEntry> {
    Some(PmEntry { style_id, model })
}

/// Resolve PM and SUB to a registry entry, checking SUB overrides first
pub fn resolve(pm: u8, sub: u8) -> Option<PmEntry> {
    match (pm, sub) {
        (128, 129) => entry(13, "HR10_2280_PRO_DIGITAL"),
        (1, _) => entry(1, "FROZEN_HORIZON_PRO"),
        (2, _) => entry(1, "FROZEN_MAGIC_PRO"),
        (3, _) => entry(1, "AX120_DIGITAL"),
        (23, _) => entry(2, "RK120_DIGITAL"),
        (16..=31, _) => entry(2, "PA120_DIGITAL"),
        (32, _) => entry(3, "AK120_DIGITAL"),
        (48, _) => entry(5, "LF8"),
        (49, _) => entry(5, "LF10"),
        (80, _) => entry(6, "LF12"),
        (96, _) => entry(7, "LF10"),
        (112, _) => entry(9, "LC2"),
        (128, _) => entry(4, "LC1"),
        (129, _) => entry(10, "LF11"),
        (144, _) => entry(11, "LF15"),
        (160, _) => entry(12, "LF13"),
        (208, _) => entry(8, "CZ1"),
        _ => None,
    }
}

/// Topology and model name for a handshake's PM/SUB.
///
/// Unknown PMs fall back to style 1 so the controller still lights up.
pub fn identify(pm: u8, sub: u8) -> (LedTopology, String) {
    match resolve(pm, sub) {
        Some(PmEntry { style_id, model }) => {
            let style = style(style_id).unwrap_or(&STYLES[0]);
            (style.topology(), model.to_string())
        },
        None => {
            warn!(pm, sub, "unknown LED product model, assuming style 1");
            (STYLES[0].topology(), format!("UNKNOWN_{pm}"))
        },
    }
}
