//! Image preparation for panels.
//!
//! Composition is the caller's job; this only scales a picture to cover the panel and
//! flattens transparency against a background colour.

use image::imageops::FilterType;
use image::{DynamicImage, Rgb as Pixel, RgbImage};
use rayon::prelude::*;
use trcc_core::Rgb;

/// Resize to fill `(width, height)`, cropping the overflow, and blend alpha over `background`
pub fn fit_image(
    image: &DynamicImage,
    background: Rgb,
    nearest: bool,
    (width, height): (u32, u32),
) -> RgbImage {
    let filter = if nearest {
        FilterType::Nearest
    } else {
        FilterType::Gaussian
    };
    let rgba = image.resize_to_fill(width, height, filter).to_rgba8();
    let (w, h) = rgba.dimensions();

    let pixels: Vec<u8> = rgba
        .as_raw()
        .par_chunks_exact(4)
        .flat_map_iter(|p| {
            let a = f64::from(p[3]) / 255.0;
            let ba = 1.0 - a;
            [0, 1, 2].map(|i| (f64::from(background[i]) * ba + f64::from(p[i]) * a) as u8)
        })
        .collect();
    RgbImage::from_raw(w, h, pixels).unwrap_or_else(|| RgbImage::new(w, h))
}

/// A single colour image at the panel resolution
pub fn solid_image(color: Rgb, (width, height): (u32, u32)) -> RgbImage {
    RgbImage::from_pixel(width, height, Pixel(color))
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;

    #[test]
    fn wide_image_is_cropped_to_fill() {
        let mut wide = RgbaImage::from_pixel(200, 100, Rgba([0, 0, 255, 255]));
        for y in 0..100 {
            wide.put_pixel(100, y, Rgba([255, 0, 0, 255]));
        }
        let fitted = fit_image(&DynamicImage::ImageRgba8(wide), [0; 3], true, (50, 50));
        assert_eq!(fitted.dimensions(), (50, 50));
        assert_eq!(fitted.get_pixel(0, 0).0, [0, 0, 255]);
    }

    #[test]
    fn transparency_blends_with_background() {
        let clear = RgbaImage::from_pixel(4, 4, Rgba([255, 255, 255, 0]));
        let fitted = fit_image(&DynamicImage::ImageRgba8(clear), [10, 20, 30], true, (4, 4));
        assert!(fitted.pixels().all(|p| p.0 == [10, 20, 30]));

        let opaque = RgbaImage::from_pixel(2, 2, Rgba([200, 0, 0, 255]));
        let fitted = fit_image(&DynamicImage::ImageRgba8(opaque), [0; 3], true, (2, 2));
        assert_eq!(fitted.get_pixel(1, 1).0, [200, 0, 0]);
    }

    #[test]
    fn solid_fills_every_pixel() {
        let image = solid_image([1, 2, 3], (8, 4));
        assert_eq!(image.dimensions(), (8, 4));
        assert!(image.pixels().all(|p| p.0 == [1, 2, 3]));
    }
}
