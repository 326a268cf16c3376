//! Static PM → FBL → resolution tables.
//!
//! FBL ("feature byte length") is the firmware's legacy resolution code. Most PM values are
//! their own FBL; the overrides below cover the rest. FBL 224 is the only code shared by
//! several resolutions and is split by PM.

/// Resolution assumed when nothing better is known
pub const DEFAULT_RESOLUTION: (u32, u32) = (320, 320);

/// PM values whose FBL differs from the PM itself
const PM_FBL_OVERRIDES: &[(u8, u8)] = &[
    (5, 50),
    (7, 64),
    (9, 224),
    (10, 224),
    (11, 224),
    (12, 224),
    (32, 100),
    (64, 114),
    (65, 192),
];

const FBL_RESOLUTIONS: &[(u8, (u32, u32))] = &[
    (36, (240, 240)),
    (37, (240, 240)),
    (50, (240, 320)),
    (51, (320, 240)),
    (54, (360, 360)),
    (64, (640, 480)),
    (72, (480, 480)),
    (100, (320, 320)),
    (101, (320, 320)),
    (102, (320, 320)),
    (114, (1600, 720)),
    (128, (1280, 480)),
    (192, (1920, 462)),
    (224, (854, 480)),
];

/// Map a product model byte (and sub-type) to its FBL code
pub fn pm_to_fbl(pm: u8, sub: u8) -> u8 {
    match (pm, sub) {
        (1, 48) => 114,
        (1, 49) => 192,
        _ => PM_FBL_OVERRIDES
            .iter()
            .find(|(p, _)| *p == pm)
            .map_or(pm, |(_, fbl)| *fbl),
    }
}

/// Map an FBL code to a resolution. `pm` only matters for FBL 224.
/// Unknown codes fall back to 320x320.
pub fn fbl_to_resolution(fbl: u8, pm: u8) -> (u32, u32) {
    if fbl == 224 {
        return match pm {
            10 => (960, 540),
            12 => (800, 480),
            _ => (854, 480),
        };
    }
    FBL_RESOLUTIONS
        .iter()
        .find(|(f, _)| *f == fbl)
        .map_or(DEFAULT_RESOLUTION, |(_, res)| *res)
}

/// Whether the FBL code is in the table
pub fn is_known_fbl(fbl: u8) -> bool {
    FBL_RESOLUTIONS.iter().any(|(f, _)| *f == fbl)
}

/// Full PM/SUB → resolution chain
pub fn pm_to_resolution(pm: u8, sub: u8) -> (u32, u32) {
    fbl_to_resolution(pm_to_fbl(pm, sub), pm)
}

/// Resolution encoded in byte 0 of a SCSI poll response
pub fn letter_to_resolution(code: u8) -> Option<(u32, u32)> {
    match code {
        b'$' => Some((240, 240)),
        b'2' | b'3' => Some((320, 240)),
        b'd' | b'e' => Some((320, 320)),
        _ => None,
    }
}

/// Letter codes of HID Type-3 firmware: the SCSI table plus `'f'`.
///
/// The `'f'` mapping to 320x320 comes from binary analysis and has not been confirmed on
/// hardware.
pub fn hid_letter_to_resolution(code: u8) -> Option<(u32, u32)> {
    match code {
        b'f' => Some((320, 320)),
        code => letter_to_resolution(code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pm_chain() {
        assert_eq!(pm_to_resolution(32, 0), (320, 320));
        assert_eq!(pm_to_resolution(10, 0), (960, 540));
        assert_eq!(pm_to_resolution(12, 0), (800, 480));
        assert_eq!(pm_to_resolution(9, 0), (854, 480));
        assert_eq!(pm_to_resolution(11, 0), (854, 480));
        assert_eq!(pm_to_resolution(5, 0), (240, 320));
        assert_eq!(pm_to_resolution(64, 0), (1600, 720));
        assert_eq!(pm_to_resolution(1, 48), (1600, 720));
        assert_eq!(pm_to_resolution(1, 49), (1920, 462));
    }

    #[test]
    fn fbl_224_depends_on_pm() {
        assert_eq!(fbl_to_resolution(224, 10), (960, 540));
        assert_eq!(fbl_to_resolution(224, 12), (800, 480));
        for pm in [0, 9, 11, 224, 255] {
            assert_eq!(fbl_to_resolution(224, pm), (854, 480));
        }
    }

    #[test]
    fn pm_is_own_fbl_without_override() {
        assert_eq!(pm_to_fbl(100, 0), 100);
        assert_eq!(pm_to_fbl(72, 3), 72);
        assert_eq!(pm_to_fbl(1, 0), 1);
    }

    #[test]
    fn unknown_fbl_defaults() {
        assert!(!is_known_fbl(3));
        assert_eq!(fbl_to_resolution(3, 3), DEFAULT_RESOLUTION);
    }

    #[test]
    fn letter_codes() {
        assert_eq!(letter_to_resolution(b'$'), Some((240, 240)));
        assert_eq!(letter_to_resolution(b'2'), Some((320, 240)));
        assert_eq!(letter_to_resolution(b'3'), Some((320, 240)));
        assert_eq!(letter_to_resolution(b'd'), Some((320, 320)));
        assert_eq!(letter_to_resolution(b'e'), Some((320, 320)));
        assert_eq!(letter_to_resolution(b'x'), None);
    }

    /// Provisional: inferred from binary analysis, unconfirmed on hardware.
    #[test]
    fn letter_f_is_hid_only() {
        assert_eq!(hid_letter_to_resolution(0x66), Some((320, 320)));
        assert_eq!(letter_to_resolution(0x66), None);
        assert_eq!(hid_letter_to_resolution(b'$'), Some((240, 240)));
        assert_eq!(hid_letter_to_resolution(b'x'), None);
    }
}
