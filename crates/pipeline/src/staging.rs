//! Transient on-disk staging of uploaded payloads.
//!
//! Each job writes its bytes to a uniquely named file inside the staging
//! directory. The file is removed when the [`StagedFile`] is released or
//! dropped, so every exit path of a conversion cleans up after itself.

use std::io::Write;
use std::path::{Path, PathBuf};

use rawbatch_core::raw_formats::raw_extension;
use tempfile::NamedTempFile;

use crate::error::StagingError;

const STAGED_FILE_PREFIX: &str = "upload-";

/// Directory that holds staged uploads while they are converted.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` to a fresh file in the staging directory.
    ///
    /// The file keeps the upload's RAW extension so format sniffing that
    /// looks at names still works.
    pub fn stage(&self, name: &str, bytes: &[u8]) -> Result<StagedFile, StagingError> {
        std::fs::create_dir_all(&self.dir).map_err(StagingError::Write)?;

        let suffix = raw_extension(name)
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();

        let mut file = tempfile::Builder::new()
            .prefix(STAGED_FILE_PREFIX)
            .suffix(&suffix)
            .tempfile_in(&self.dir)
            .map_err(StagingError::Write)?;

        file.write_all(bytes).map_err(StagingError::Write)?;
        file.flush().map_err(StagingError::Write)?;

        tracing::trace!(file = name, path = %file.path().display(), "Staged upload");
        Ok(StagedFile { file })
    }
}

/// A staged upload. Deleted on [`release`](StagedFile::release) or drop.
#[derive(Debug)]
pub struct StagedFile {
    file: NamedTempFile,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Delete the staged file, reporting failures instead of swallowing them.
    pub fn release(self) -> Result<(), StagingError> {
        self.file.close().map_err(StagingError::Cleanup)
    }
}
