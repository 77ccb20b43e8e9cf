//! Shared helpers for pipeline integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use image::metadata::Orientation;
use image::{DynamicImage, RgbImage};
use rawbatch_events::{BatchEvent, BatchEventKind};
use rawbatch_pipeline::transform::encode_jpeg;
use rawbatch_pipeline::{
    Converter, Coordinator, CoordinatorConfig, DecodeError, DecodedImage, DevelopingDecoder,
    ImageOrigin, RawDecoder, RawSource, StagingArea,
};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Payload builders
// ---------------------------------------------------------------------------

/// A fake RAW container: opaque bytes around one embedded JPEG preview.
pub fn synthetic_raw(width: u32, height: u32) -> Vec<u8> {
    let preview = DynamicImage::ImageRgb8(RgbImage::from_pixel(
        width,
        height,
        image::Rgb([180, 90, 30]),
    ));
    let jpeg = encode_jpeg(&preview, 90).expect("preview encodes");

    let mut bytes = b"II*\0FAKE".to_vec();
    bytes.extend(std::iter::repeat(0x5A).take(1024));
    bytes.extend_from_slice(&jpeg);
    bytes.extend(std::iter::repeat(0x00).take(128));
    bytes
}

/// Bytes that no decoder accepts.
pub fn corrupt_raw() -> Vec<u8> {
    b"this is not sensor data".repeat(8)
}

// ---------------------------------------------------------------------------
// Scripted decoder
// ---------------------------------------------------------------------------

/// Decoder driven by the payload text:
///
/// - `BAD`: decode error
/// - `PANIC`: panics
/// - `sleep:<ms>`: sleeps, then succeeds
/// - anything else: a 400x300 image
pub struct ScriptedDecoder;

impl RawDecoder for ScriptedDecoder {
    fn decode(&self, source: &RawSource<'_>) -> Result<DecodedImage, DecodeError> {
        let script = String::from_utf8_lossy(source.bytes);

        if script == "BAD" {
            return Err(DecodeError::new(source.name, "scripted failure"));
        }
        if script == "PANIC" {
            panic!("scripted panic decoding {}", source.name);
        }
        if let Some(ms) = script.strip_prefix("sleep:") {
            let ms: u64 = ms.parse().expect("sleep duration");
            std::thread::sleep(Duration::from_millis(ms));
        }

        Ok(DecodedImage {
            image: DynamicImage::ImageRgb8(RgbImage::new(400, 300)),
            orientation: Orientation::NoTransforms,
            origin: ImageOrigin::Developed,
        })
    }
}

pub fn sleep_payload(ms: u64) -> Vec<u8> {
    format!("sleep:{ms}").into_bytes()
}

// ---------------------------------------------------------------------------
// Coordinator builders
// ---------------------------------------------------------------------------

pub fn coordinator_with(
    decoder: impl RawDecoder + 'static,
    staging: &Path,
    concurrency: usize,
    job_timeout: Duration,
) -> Coordinator {
    let converter = Converter::new(Arc::new(decoder), StagingArea::new(staging));
    Coordinator::new(
        Arc::new(converter),
        CoordinatorConfig {
            concurrency,
            job_timeout,
        },
    )
}

pub fn scripted_coordinator(staging: &Path, concurrency: usize) -> Coordinator {
    coordinator_with(ScriptedDecoder, staging, concurrency, Duration::from_secs(30))
}

pub fn real_coordinator(staging: &Path) -> Coordinator {
    coordinator_with(DevelopingDecoder::new(), staging, 2, Duration::from_secs(60))
}

// ---------------------------------------------------------------------------
// Event helpers
// ---------------------------------------------------------------------------

/// Everything already buffered on the receiver.
pub fn drain(rx: &mut broadcast::Receiver<BatchEvent>) -> Vec<BatchEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// `(message, percent, is_error)` of every progress event, in order.
pub fn progress_of(events: &[BatchEvent]) -> Vec<(String, f64, bool)> {
    events
        .iter()
        .filter_map(|event| match &event.kind {
            BatchEventKind::Progress(p) => {
                Some((p.message.clone(), p.percent_complete, p.is_error))
            }
            _ => None,
        })
        .collect()
}
