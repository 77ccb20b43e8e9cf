//! Long-edge resizing and JPEG encoding.

use image::imageops::FilterType;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

use crate::error::EncodeError;

/// Long edge of images converted in low-resolution mode.
pub const LOW_RES_LONG_EDGE: u32 = 1920;

/// JPEG quality used for every output.
pub const JPEG_QUALITY: u8 = 85;

/// Dimensions after scaling so the longer side equals `target`.
///
/// The shorter side is `round(target * short / long)`, never below 1.
pub fn long_edge_dimensions(width: u32, height: u32, target: u32) -> (u32, u32) {
    let scale_short = |short: u32, long: u32| -> u32 {
        let scaled = (f64::from(target) * f64::from(short) / f64::from(long)).round();
        (scaled as u32).max(1)
    };

    if width >= height {
        (target, scale_short(height, width))
    } else {
        (scale_short(width, height), target)
    }
}

/// Scale `image` so its longer side is `target` pixels (Catmull-Rom).
///
/// Images that already have the target size, or have no pixels, are
/// returned unchanged.
pub fn resize_long_edge(image: DynamicImage, target: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return image;
    }

    let (new_width, new_height) = long_edge_dimensions(width, height, target);
    if (new_width, new_height) == (width, height) {
        return image;
    }

    tracing::trace!(width, height, new_width, new_height, "Resizing to long edge");
    image.resize_exact(new_width, new_height, FilterType::CatmullRom)
}

/// Encode as baseline RGB JPEG.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(EncodeError::EmptyImage);
    }

    let rgb = image.to_rgb8();
    let mut out = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))?;
    Ok(out)
}
