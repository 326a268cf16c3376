//! Frame encoding for the wire.
//!
//! Most panels take 16-bit RGB565 pixels; 320x320 firmware reads them big-endian, every
//! other resolution little-endian. HID Type-2 panels decode JPEG themselves.

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use rayon::prelude::*;

use crate::{DeviceError, Result, Rgb};

/// JPEG quality used for panels that take compressed frames
pub const JPEG_QUALITY: u8 = 85;

/// Payload format a protocol expects in `send_frame`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// Raw RGB565 in the resolution's byte order
    Rgb565,
    /// Baseline JPEG
    Jpeg,
}

/// Byte order of RGB565 pixels on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    pub fn for_resolution((width, height): (u32, u32)) -> Self {
        if (width, height) == (320, 320) {
            Self::Big
        } else {
            Self::Little
        }
    }

    #[inline(always)]
    pub fn bytes(self, pixel: u16) -> [u8; 2] {
        match self {
            Self::Big => pixel.to_be_bytes(),
            Self::Little => pixel.to_le_bytes(),
        }
    }

    #[inline(always)]
    pub fn pixel(self, bytes: [u8; 2]) -> u16 {
        match self {
            Self::Big => u16::from_be_bytes(bytes),
            Self::Little => u16::from_le_bytes(bytes),
        }
    }
}

/// Pack one colour, truncating each channel
#[inline(always)]
pub fn pack_rgb565([r, g, b]: Rgb) -> u16 {
    ((r as u16 & 0xF8) << 8) | ((g as u16 & 0xFC) << 3) | (b as u16 >> 3)
}

/// Unpack one pixel, leaving the dropped low bits zero
#[inline(always)]
pub fn unpack_rgb565(pixel: u16) -> Rgb {
    [
        ((pixel >> 8) & 0xF8) as u8,
        ((pixel >> 3) & 0xFC) as u8,
        ((pixel << 3) & 0xF8) as u8,
    ]
}

/// Bytes in one RGB565 frame
pub const fn frame_len((width, height): (u32, u32)) -> usize {
    width as usize * height as usize * 2
}

/// Encode a packed RGB888 buffer for a panel of the given resolution
pub fn encode_rgb888(pixels: &[u8], resolution: (u32, u32)) -> Result<Vec<u8>> {
    let expected = resolution.0 as usize * resolution.1 as usize * 3;
    if pixels.len() != expected {
        return Err(DeviceError::InvalidFrame {
            expected,
            actual: pixels.len(),
        });
    }
    let order = ByteOrder::for_resolution(resolution);
    Ok(pixels
        .par_chunks_exact(3)
        .flat_map_iter(|p| order.bytes(pack_rgb565([p[0], p[1], p[2]])))
        .collect())
}

/// Encode an already composed image; its dimensions are the panel resolution
pub fn encode_image(image: &RgbImage) -> Vec<u8> {
    let order = ByteOrder::for_resolution(image.dimensions());
    image
        .as_raw()
        .par_chunks_exact(3)
        .flat_map_iter(|p| order.bytes(pack_rgb565([p[0], p[1], p[2]])))
        .collect()
}

/// Compress an image for panels that decode JPEG
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(image)
        .map_err(|e| DeviceError::Unsupported {
            protocol: "jpeg",
            what: e.to_string(),
        })?;
    Ok(out)
}

/// Encode an image in the given wire format
pub fn encode(image: &RgbImage, format: FrameFormat) -> Result<Vec<u8>> {
    match format {
        FrameFormat::Rgb565 => Ok(encode_image(image)),
        FrameFormat::Jpeg => encode_jpeg(image, JPEG_QUALITY),
    }
}

/// Decode a wire frame back into packed RGB888
pub fn decode_rgb565(frame: &[u8], resolution: (u32, u32)) -> Result<Vec<u8>> {
    let expected = frame_len(resolution);
    if frame.len() != expected {
        return Err(DeviceError::InvalidFrame {
            expected,
            actual: frame.len(),
        });
    }
    let order = ByteOrder::for_resolution(resolution);
    Ok(frame
        .par_chunks_exact(2)
        .flat_map_iter(|p| unpack_rgb565(order.pixel([p[0], p[1]])))
        .collect())
}

/// A single-colour frame
pub fn solid(color: Rgb, resolution: (u32, u32)) -> Vec<u8> {
    let px = ByteOrder::for_resolution(resolution).bytes(pack_rgb565(color));
    px.repeat(frame_len(resolution) / 2)
}
