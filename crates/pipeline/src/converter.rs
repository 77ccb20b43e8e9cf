//! Single-file conversion: stage, decode, optionally resize, encode.
//!
//! [`Converter::convert`] never returns an error and never lets one escape:
//! every failure becomes a [`ConversionResult::Failure`] carrying the
//! original name and a message naming the file.

use std::fmt;
use std::sync::Arc;

use rawbatch_core::raw_formats::{base_name, output_name};

use crate::decoder::{RawDecoder, RawSource};
use crate::error::ConversionError;
use crate::staging::StagingArea;
use crate::transform::{encode_jpeg, resize_long_edge, JPEG_QUALITY, LOW_RES_LONG_EDGE};

/// One uploaded file waiting to be converted.
#[derive(Clone)]
pub struct ConversionJob {
    pub source_name: String,
    /// Archive entry name. Derived from `source_name`; made unique within a
    /// batch during validation.
    pub output_name: String,
    pub raw_bytes: Vec<u8>,
    /// Downscale so the long edge is [`LOW_RES_LONG_EDGE`].
    pub low_res: bool,
}

impl ConversionJob {
    pub fn new(source_name: impl Into<String>, raw_bytes: Vec<u8>, low_res: bool) -> Self {
        let source_name = source_name.into();
        Self {
            output_name: output_name(&source_name),
            source_name,
            raw_bytes,
            low_res,
        }
    }
}

impl fmt::Debug for ConversionJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionJob")
            .field("source_name", &self.source_name)
            .field("output_name", &self.output_name)
            .field("raw_bytes", &self.raw_bytes.len())
            .field("low_res", &self.low_res)
            .finish()
    }
}

/// Outcome of converting one job.
#[derive(Clone, PartialEq, Eq)]
pub enum ConversionResult {
    Success {
        output_name: String,
        jpeg_bytes: Vec<u8>,
    },
    Failure {
        original_name: String,
        message: String,
    },
}

impl ConversionResult {
    /// Failure for `source_name` with the standard "error converting" prefix.
    pub fn failed(source_name: &str, cause: impl fmt::Display) -> Self {
        Self::Failure {
            original_name: source_name.to_string(),
            message: format!("error converting {}: {cause}", base_name(source_name)),
        }
    }
}

impl fmt::Debug for ConversionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success {
                output_name,
                jpeg_bytes,
            } => f
                .debug_struct("Success")
                .field("output_name", output_name)
                .field("jpeg_bytes", &jpeg_bytes.len())
                .finish(),
            Self::Failure {
                original_name,
                message,
            } => f
                .debug_struct("Failure")
                .field("original_name", original_name)
                .field("message", message)
                .finish(),
        }
    }
}

/// Combines a [`RawDecoder`] with the image transform.
pub struct Converter {
    decoder: Arc<dyn RawDecoder>,
    staging: StagingArea,
    long_edge: u32,
    quality: u8,
}

impl Converter {
    pub fn new(decoder: Arc<dyn RawDecoder>, staging: StagingArea) -> Self {
        Self {
            decoder,
            staging,
            long_edge: LOW_RES_LONG_EDGE,
            quality: JPEG_QUALITY,
        }
    }

    /// Convert one job. Blocking; run it off the async executor.
    pub fn convert(&self, job: ConversionJob) -> ConversionResult {
        match self.try_convert(&job) {
            Ok(jpeg_bytes) => {
                tracing::info!(
                    file = %job.source_name,
                    output = %job.output_name,
                    bytes = jpeg_bytes.len(),
                    "Converted to JPEG",
                );
                ConversionResult::Success {
                    output_name: job.output_name,
                    jpeg_bytes,
                }
            }
            Err(e) => {
                tracing::warn!(file = %job.source_name, error = %e, "Conversion failed");
                ConversionResult::failed(&job.source_name, e)
            }
        }
    }

    fn try_convert(&self, job: &ConversionJob) -> Result<Vec<u8>, ConversionError> {
        let staged = self.staging.stage(&job.source_name, &job.raw_bytes)?;

        let encoded = self.decode_and_encode(job, staged.path());

        match (encoded, staged.release()) {
            (Ok(bytes), Ok(())) => Ok(bytes),
            (Ok(_), Err(cleanup)) => Err(cleanup.into()),
            (Err(e), cleanup) => {
                if let Err(cleanup) = cleanup {
                    tracing::warn!(file = %job.source_name, error = %cleanup, "Staged file left behind");
                }
                Err(e)
            }
        }
    }

    fn decode_and_encode(
        &self,
        job: &ConversionJob,
        staged_path: &std::path::Path,
    ) -> Result<Vec<u8>, ConversionError> {
        let decoded = self.decoder.decode(&RawSource {
            name: &job.source_name,
            bytes: &job.raw_bytes,
            path: staged_path,
        })?;

        let image = if job.low_res {
            resize_long_edge(decoded.image, self.long_edge)
        } else {
            decoded.image
        };

        Ok(encode_jpeg(&image, self.quality)?)
    }
}
