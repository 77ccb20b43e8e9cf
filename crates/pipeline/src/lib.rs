//! Concurrent RAW-to-JPEG batch conversion pipeline.
//!
//! Leaves first:
//!
//! - [`decoder`]: [`RawDecoder`] trait and the default decoder that prefers
//!   embedded previews and falls back to full RAW development.
//! - [`transform`]: long-edge resize and JPEG encoding.
//! - [`staging`]: transient on-disk copies of uploaded payloads.
//! - [`converter`]: one file in, one [`ConversionResult`] out.
//! - [`coordinator`]: bounded fan-out of a batch with per-completion
//!   progress events.
//! - [`archive`]: ZIP packaging of the successful outputs.

pub mod archive;
pub mod converter;
pub mod coordinator;
pub mod decoder;
pub mod error;
pub mod staging;
pub mod transform;

pub use archive::build_archive;
pub use converter::{ConversionJob, ConversionResult, Converter};
pub use coordinator::{AcceptedJobs, BatchState, Coordinator, CoordinatorConfig, FailedFile};
pub use decoder::{DecodedImage, DevelopingDecoder, ImageOrigin, RawDecoder, RawSource};
pub use error::{
    ConversionError, DecodeError, EncodeError, PackagingError, StagingError, ValidationError,
};
pub use staging::{StagedFile, StagingArea};
