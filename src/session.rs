//! One open device.
//!
//! A session serialises every operation on its protocol behind a mutex, so it can be shared
//! between a UI thread and a frame producer without interleaving transfers.

use std::sync::{Mutex, MutexGuard};

use image::RgbImage;
use tracing::{debug, info, warn};
use trcc_core::frame::{encode, encode_rgb888, FrameFormat};
use trcc_core::{
    DeviceDescriptor, DeviceError, DeviceProtocol, Geometry, HandshakeResult, ProtocolKind,
    Result, Rgb,
};

use crate::config::DeviceOverride;
use crate::factory;
use crate::probe_cache::{device_key, ProbeCache};

/// Handshake an LED controller at most once per power cycle.
///
/// A cached result (bus key, then plain VID:PID key) is restored without any I/O. Only on a
/// miss does the live handshake run, and its result is stored before returning. A failed
/// store is logged, the handshake result is still returned.
pub fn probe_led(
    descriptor: &DeviceDescriptor,
    protocol: &mut dyn DeviceProtocol,
    cache: &mut ProbeCache,
) -> Result<HandshakeResult> {
    if let Some(cached) = cache.lookup_device(descriptor) {
        info!(device = %descriptor.vid_pid(), pm = cached.pm, "probe cache hit");
        protocol.restore(&cached)?;
        return Ok(cached);
    }
    debug!(device = %descriptor.vid_pid(), "probe cache miss, handshaking");
    let result = protocol.handshake()?;
    if let Err(e) = cache.store(&device_key(descriptor), &result) {
        warn!(path = %cache.path().display(), error = %e, "failed to persist probe result");
    }
    Ok(result)
}

struct Inner {
    protocol: Box<dyn DeviceProtocol>,
    result: Option<HandshakeResult>,
}

pub struct DeviceSession {
    descriptor: DeviceDescriptor,
    inner: Mutex<Inner>,
}

impl DeviceSession {
    pub fn new(descriptor: DeviceDescriptor, protocol: Box<dyn DeviceProtocol>) -> Self {
        Self {
            descriptor,
            inner: Mutex::new(Inner {
                protocol,
                result: None,
            }),
        }
    }

    /// Build the protocol for a discovered device. No I/O.
    pub fn open(descriptor: DeviceDescriptor) -> Result<Self> {
        let protocol = factory::create(&descriptor)?;
        Ok(Self::new(descriptor, protocol))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// Result of the last handshake
    pub fn result(&self) -> Option<HandshakeResult> {
        self.lock().result.clone()
    }

    /// Identify the device. LED controllers go through the probe cache.
    pub fn handshake(&self, cache: &mut ProbeCache) -> Result<HandshakeResult> {
        let mut inner = self.lock();
        let result = match self.descriptor.kind {
            ProtocolKind::HidLed => probe_led(&self.descriptor, inner.protocol.as_mut(), cache)?,
            _ => inner.protocol.handshake()?,
        };
        info!(
            device = %self.descriptor.vid_pid(),
            kind = %self.descriptor.kind,
            pm = result.pm,
            sub = result.sub,
            "session ready"
        );
        inner.result = Some(result.clone());
        Ok(result)
    }

    /// Apply a per-device override on top of the handshake result
    pub fn apply_override(&self, device: &DeviceOverride) -> Result<Option<HandshakeResult>> {
        let mut inner = self.lock();
        let (Some(style_id), Some(current)) = (device.led_style, inner.result.clone()) else {
            return Ok(inner.result.clone());
        };
        let style = trcc_led::styles::style(style_id).ok_or_else(|| DeviceError::Unsupported {
            protocol: self.descriptor.kind.name(),
            what: format!("led style {style_id}"),
        })?;
        let result = HandshakeResult {
            geometry: Geometry::Leds(style.topology()),
            model: Some(style.model.into()),
            ..current
        };
        inner.protocol.restore(&result)?;
        debug!(style_id, "led style overridden");
        inner.result = Some(result.clone());
        Ok(Some(result))
    }

    /// Panel resolution, once handshaken
    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.lock().result.as_ref().and_then(HandshakeResult::resolution)
    }

    /// Payload already in the protocol's wire format
    pub fn send_frame(&self, data: &[u8]) -> Result<()> {
        self.lock().protocol.send_frame(data)
    }

    /// Encode an image for the panel and send it. The image must match the resolution.
    pub fn send_image(&self, image: &RgbImage) -> Result<()> {
        let mut inner = self.lock();
        let resolution = panel_resolution(&inner, &self.descriptor)?;
        if image.dimensions() != resolution {
            return Err(DeviceError::InvalidFrame {
                expected: trcc_core::frame::frame_len(resolution),
                actual: trcc_core::frame::frame_len(image.dimensions()),
            });
        }
        let format = inner.protocol.frame_format();
        let frame = encode(image, format)?;
        inner.protocol.send_frame(&frame)
    }

    /// Packed RGB888 at the panel resolution
    pub fn send_rgb888(&self, pixels: &[u8]) -> Result<()> {
        let mut inner = self.lock();
        let resolution = panel_resolution(&inner, &self.descriptor)?;
        match inner.protocol.frame_format() {
            FrameFormat::Rgb565 => {
                let frame = encode_rgb888(pixels, resolution)?;
                inner.protocol.send_frame(&frame)
            },
            FrameFormat::Jpeg => {
                let (width, height) = resolution;
                let image = RgbImage::from_raw(width, height, pixels.to_vec()).ok_or(
                    DeviceError::InvalidFrame {
                        expected: (width * height * 3) as usize,
                        actual: pixels.len(),
                    },
                )?;
                let frame = encode(&image, FrameFormat::Jpeg)?;
                inner.protocol.send_frame(&frame)
            },
        }
    }

    /// Logical LED colours at a brightness of 0..=100
    pub fn send_led(&self, colors: &[Rgb], brightness: u8) -> Result<()> {
        let mut inner = self.lock();
        let kind = inner.protocol.kind();
        inner
            .protocol
            .as_leds()
            .ok_or_else(|| DeviceError::Unsupported {
                protocol: kind.name(),
                what: "led colours".into(),
            })?
            .send_colors(colors, brightness)
    }

    pub fn clear(&self) -> Result<()> {
        self.lock().protocol.clear()
    }

    pub fn close(&self) {
        let mut inner = self.lock();
        inner.protocol.close();
        inner.result = None;
    }
}

fn panel_resolution(inner: &Inner, descriptor: &DeviceDescriptor) -> Result<(u32, u32)> {
    match &inner.result {
        Some(result) => result.resolution().ok_or_else(|| DeviceError::Unsupported {
            protocol: descriptor.kind.name(),
            what: "pixel frames".into(),
        }),
        None => Err(DeviceError::HandshakeRequired {
            protocol: descriptor.kind.name(),
            stage: "frame",
        }),
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
    }
}
