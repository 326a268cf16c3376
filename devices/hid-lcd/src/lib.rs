//! HID LCD protocols.
//!
//! Both variants talk raw endpoint transfers (OUT 0x02, IN 0x81) and identify the panel
//! with the retrying [`Exchange::HID`](trcc_core::handshake::Exchange::HID) handshake.

mod type2;
mod type3;

pub use type2::HidLcdType2;
pub use type3::HidLcdType3;

pub mod consts {
    use std::time::Duration;

    pub const WINBOND_VENDOR_ID: u16 = 0x0416;
    pub const ALI_VENDOR_ID: u16 = 0x0418;

    /// Type 2 product ids (Winbond)
    pub const TYPE2_PRODUCT_IDS: [u16; 2] = [0x5302, 0x530A];
    /// Type 3 product ids (ALi)
    pub const TYPE3_PRODUCT_IDS: [u16; 2] = [0x5303, 0x5304];
    /// Type 3 firmware on a Winbond bridge
    pub const TYPE3_WINBOND_PRODUCT_ID: u16 = 0x53E6;

    pub const FRAME_TIMEOUT: Duration = Duration::from_millis(100);
    /// After each Type 2 frame
    pub const TYPE2_FRAME_DELAY: Duration = Duration::from_millis(1);
}
