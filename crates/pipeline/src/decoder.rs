//! RAW decoding adapter.
//!
//! [`RawDecoder`] is the seam between the pipeline and whatever turns RAW
//! bytes into pixels. [`DevelopingDecoder`] is the production
//! implementation:
//!
//! 1. Look for an embedded JPEG preview and decode the largest one found.
//!    The recorded EXIF orientation is applied to it.
//! 2. Without a preview, develop the sensor data with `imagepipe`
//!    (rawloader decode, demosaic, camera white balance, highlights clipped
//!    at the white level, sRGB 8-bit output).

use std::io::Cursor;
use std::path::Path;

use image::metadata::Orientation;
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage};

use crate::error::DecodeError;

/// JPEG start-of-image marker followed by the first marker prefix.
const JPEG_SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Upper bound on start-of-image candidates probed per file. Sensor data can
/// contain the marker by chance, and real RAW files carry only a handful of
/// previews.
const MAX_PREVIEW_CANDIDATES: usize = 64;

/// `ftyp` box with the Canon CR3 major brand, at offset 4 of the file.
const CR3_FTYP: &[u8; 8] = b"ftypcrx ";

/// CR3 box holding IFD0 as a bare TIFF stream.
const CR3_IFD0_BOX: &[u8; 4] = b"CMT1";

/// The CR3 metadata boxes sit in `moov` at the start of the file.
const CR3_HEADER_SCAN: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A RAW payload handed to a decoder.
#[derive(Debug, Clone, Copy)]
pub struct RawSource<'a> {
    /// Original upload name, used for error attribution.
    pub name: &'a str,
    /// The payload bytes.
    pub bytes: &'a [u8],
    /// Staged on-disk copy of `bytes`.
    pub path: &'a Path,
}

/// Where the decoded pixels came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOrigin {
    EmbeddedPreview,
    Developed,
}

/// Pixels ready for display, already rotated upright.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    /// Orientation recorded in the file (already applied to `image`).
    pub orientation: Orientation,
    pub origin: ImageOrigin,
}

/// Turns RAW bytes into a displayable image.
pub trait RawDecoder: Send + Sync {
    fn decode(&self, source: &RawSource<'_>) -> Result<DecodedImage, DecodeError>;
}

// ---------------------------------------------------------------------------
// DevelopingDecoder
// ---------------------------------------------------------------------------

/// Preview-first decoder with full RAW development as fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevelopingDecoder;

impl DevelopingDecoder {
    pub fn new() -> Self {
        Self
    }

    fn develop(&self, source: &RawSource<'_>) -> Result<DynamicImage, DecodeError> {
        let mut pipeline = imagepipe::Pipeline::new_from_file(source.path).map_err(|e| {
            DecodeError::new(source.name, format!("unsupported or corrupt RAW data: {e}"))
        })?;

        let srgb = pipeline
            .output_8bit(None)
            .map_err(|e| DecodeError::new(source.name, format!("RAW development failed: {e}")))?;

        let (width, height) = (srgb.width as u32, srgb.height as u32);
        let buffer = RgbImage::from_raw(width, height, srgb.data).ok_or_else(|| {
            DecodeError::new(
                source.name,
                format!("developed buffer does not match {width}x{height}"),
            )
        })?;

        Ok(DynamicImage::ImageRgb8(buffer))
    }
}

impl RawDecoder for DevelopingDecoder {
    fn decode(&self, source: &RawSource<'_>) -> Result<DecodedImage, DecodeError> {
        if let Some((mut image, preview_bytes)) = extract_embedded_preview(source.bytes) {
            let orientation = read_orientation(preview_bytes)
                .or_else(|| read_orientation(source.bytes))
                .unwrap_or(Orientation::NoTransforms);
            image.apply_orientation(orientation);

            tracing::debug!(
                file = source.name,
                width = image.width(),
                height = image.height(),
                ?orientation,
                "Decoded embedded preview",
            );
            return Ok(DecodedImage {
                image,
                orientation,
                origin: ImageOrigin::EmbeddedPreview,
            });
        }

        tracing::debug!(file = source.name, "No embedded preview, developing RAW data");
        // imagepipe rotates the developed image itself.
        let image = self.develop(source)?;
        let orientation = read_orientation(source.bytes).unwrap_or(Orientation::NoTransforms);

        Ok(DecodedImage {
            image,
            orientation,
            origin: ImageOrigin::Developed,
        })
    }
}

// ---------------------------------------------------------------------------
// Embedded preview extraction
// ---------------------------------------------------------------------------

/// Offsets of every JPEG start-of-image marker in `bytes`.
fn preview_candidates(bytes: &[u8]) -> impl Iterator<Item = usize> + '_ {
    bytes
        .windows(JPEG_SOI.len())
        .enumerate()
        .filter(|(_, window)| *window == JPEG_SOI)
        .map(|(offset, _)| offset)
        .take(MAX_PREVIEW_CANDIDATES)
}

/// Read only the header of a JPEG stream starting at `offset`.
fn probe_dimensions(bytes: &[u8], offset: usize) -> Option<(u32, u32)> {
    let (width, height) = ImageReader::with_format(Cursor::new(&bytes[offset..]), ImageFormat::Jpeg)
        .into_dimensions()
        .ok()?;
    (width > 0 && height > 0).then_some((width, height))
}

/// Decode the largest embedded JPEG preview, if any.
///
/// Returns the image together with the preview's byte slice (from its
/// start-of-image marker to the end of the payload) for EXIF lookup.
pub fn extract_embedded_preview(bytes: &[u8]) -> Option<(DynamicImage, &[u8])> {
    let mut candidates: Vec<(usize, u64)> = preview_candidates(bytes)
        .filter_map(|offset| {
            probe_dimensions(bytes, offset).map(|(w, h)| (offset, u64::from(w) * u64::from(h)))
        })
        .collect();

    // Largest first; a candidate that only looked like a JPEG header is
    // skipped when its full decode fails.
    candidates.sort_by(|a, b| b.1.cmp(&a.1));

    candidates.into_iter().find_map(|(offset, _)| {
        let slice = &bytes[offset..];
        ImageReader::with_format(Cursor::new(slice), ImageFormat::Jpeg)
            .decode()
            .ok()
            .map(|image| (image, slice))
    })
}

// ---------------------------------------------------------------------------
// Orientation
// ---------------------------------------------------------------------------

/// Read the EXIF orientation from a JPEG stream, a TIFF-based RAW file
/// (CR2, NEF) or a CR3 container.
pub fn read_orientation(bytes: &[u8]) -> Option<Orientation> {
    match exif::Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif) => orientation_of(&exif),
        Err(_) => read_cr3_orientation(bytes),
    }
}

/// CR3 is an ISO base media file; IFD0 lives in the `CMT1` box under
/// `moov`, which kamadak-exif does not walk on its own.
fn read_cr3_orientation(bytes: &[u8]) -> Option<Orientation> {
    if bytes.get(4..12)? != CR3_FTYP {
        return None;
    }
    let head = &bytes[..bytes.len().min(CR3_HEADER_SCAN)];
    let type_at = head.windows(CR3_IFD0_BOX.len()).position(|w| w == CR3_IFD0_BOX)?;
    let box_start = type_at.checked_sub(4)?;
    let size = u32::from_be_bytes(bytes[box_start..type_at].try_into().ok()?) as usize;
    let tiff = bytes.get(type_at + CR3_IFD0_BOX.len()..box_start.checked_add(size)?)?;

    let exif = exif::Reader::new().read_raw(tiff.to_vec()).ok()?;
    orientation_of(&exif)
}

fn orientation_of(exif: &exif::Exif) -> Option<Orientation> {
    let value = exif
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)?
        .value
        .get_uint(0)?;
    Orientation::from_exif(u8::try_from(value).ok()?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
