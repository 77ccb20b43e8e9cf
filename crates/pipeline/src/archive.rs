//! ZIP packaging of converted outputs.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::PackagingError;

/// Build a deflate-compressed archive with one flat entry per output.
///
/// Entries appear in key order. An empty map is refused; callers report
/// "nothing to package" instead.
pub fn build_archive(results: &BTreeMap<String, Vec<u8>>) -> Result<Vec<u8>, PackagingError> {
    if results.is_empty() {
        return Err(PackagingError::Empty);
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, bytes) in results {
        writer.start_file(name.as_str(), options)?;
        writer.write_all(bytes)?;
    }

    let archive = writer.finish()?.into_inner();
    tracing::debug!(entries = results.len(), bytes = archive.len(), "Archive built");
    Ok(archive)
}
