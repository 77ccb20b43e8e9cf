//! Error types for every stage of the pipeline.
//!
//! Per-file errors ([`StagingError`], [`DecodeError`], [`EncodeError`]) never
//! leave the converter; they are folded into a
//! [`ConversionResult::Failure`](crate::ConversionResult::Failure).
//! [`ValidationError`] and [`PackagingError`] are batch-level.

use std::io;

/// The submitted batch cannot run at all.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No files were submitted")]
    NoFiles,

    #[error("No .cr2, .cr3 or .nef file found")]
    NoRawFiles,
}

/// The RAW payload could not be turned into pixels.
///
/// `file` keeps the original upload name for attribution; the display
/// output is only the cause.
#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct DecodeError {
    pub file: String,
    pub reason: String,
}

impl DecodeError {
    pub fn new(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("decoded image has zero width or height")]
    EmptyImage,

    #[error("JPEG encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("could not stage upload: {0}")]
    Write(#[source] io::Error),

    #[error("could not release staged upload: {0}")]
    Cleanup(#[source] io::Error),
}

/// Everything that can go wrong converting a single file.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Building the archive failed after at least one file converted.
#[derive(Debug, thiserror::Error)]
pub enum PackagingError {
    #[error("refusing to build an archive with no entries")]
    Empty,

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
