//! On-disk storage for finished batch archives.
//!
//! Every batch gets its own `<batch_id>.zip` under the archive directory, so
//! concurrent batches never overwrite each other. The store keeps the
//! insertion order in memory; the newest entry answers "latest" requests and
//! the oldest entries are deleted once more than `retention` are held.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};

use rawbatch_core::types::BatchId;
use tokio::sync::RwLock;

/// File extension of stored archives.
const ARCHIVE_EXTENSION: &str = "zip";

pub struct ArchiveStore {
    dir: PathBuf,
    retention: usize,
    /// Stored batches, oldest first.
    index: RwLock<VecDeque<BatchId>>,
}

impl ArchiveStore {
    /// Open (and create if needed) the archive directory.
    ///
    /// Archives left by a previous run are indexed by modification time so
    /// they stay downloadable after a restart. Anything beyond `retention`
    /// is deleted, oldest first.
    pub fn open(dir: impl Into<PathBuf>, retention: usize) -> io::Result<Self> {
        let dir = dir.into();
        let retention = retention.max(1);
        std::fs::create_dir_all(&dir)?;

        let mut existing: Vec<(std::time::SystemTime, BatchId)> = std::fs::read_dir(&dir)?
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension()? != ARCHIVE_EXTENSION {
                    return None;
                }
                let batch_id = path.file_stem()?.to_str()?.parse().ok()?;
                let modified = entry.metadata().ok()?.modified().ok()?;
                Some((modified, batch_id))
            })
            .collect();
        existing.sort();

        let excess = existing.len().saturating_sub(retention);
        for (_, old) in existing.drain(..excess) {
            let path = dir.join(format!("{old}.{ARCHIVE_EXTENSION}"));
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(batch_id = %old, "Evicted archive past retention"),
                Err(e) => tracing::warn!(batch_id = %old, error = %e, "Failed to evict archive"),
            }
        }

        tracing::info!(dir = %dir.display(), existing = existing.len(), evicted = excess, "Archive store opened");

        Ok(Self {
            dir,
            retention,
            index: RwLock::new(existing.into_iter().map(|(_, id)| id).collect()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the archive of `batch_id` lives (whether or not it exists).
    pub fn path_for(&self, batch_id: BatchId) -> PathBuf {
        self.dir.join(format!("{batch_id}.{ARCHIVE_EXTENSION}"))
    }

    /// Persist an archive and make it the latest one.
    ///
    /// The bytes are written to a temporary name first and renamed into
    /// place, so readers never see a partial file. The temporary file is
    /// removed if either step fails.
    pub async fn store(&self, batch_id: BatchId, bytes: Vec<u8>) -> io::Result<PathBuf> {
        let path = self.path_for(batch_id);
        let partial = self.dir.join(format!("{batch_id}.{ARCHIVE_EXTENSION}.partial"));

        tokio::fs::create_dir_all(&self.dir).await?;
        let written = match tokio::fs::write(&partial, &bytes).await {
            Ok(()) => tokio::fs::rename(&partial, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(%batch_id, error = %cleanup, "Partial archive left behind");
                }
            }
            return Err(e);
        }

        let evicted: Vec<BatchId> = {
            let mut index = self.index.write().await;
            index.retain(|id| *id != batch_id);
            index.push_back(batch_id);
            let excess = index.len().saturating_sub(self.retention);
            index.drain(..excess).collect()
        };

        for old in evicted {
            match tokio::fs::remove_file(self.path_for(old)).await {
                Ok(()) => tracing::debug!(batch_id = %old, "Evicted archive"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(batch_id = %old, error = %e, "Failed to evict archive"),
            }
        }

        tracing::info!(%batch_id, bytes = bytes.len(), path = %path.display(), "Archive stored");
        Ok(path)
    }

    /// Read the archive of `batch_id`, if one is stored.
    pub async fn get(&self, batch_id: BatchId) -> io::Result<Option<Vec<u8>>> {
        if !self.index.read().await.contains(&batch_id) {
            return Ok(None);
        }
        read_if_exists(&self.path_for(batch_id)).await
    }

    /// The most recently stored archive.
    pub async fn latest(&self) -> io::Result<Option<(BatchId, Vec<u8>)>> {
        let Some(batch_id) = self.index.read().await.back().copied() else {
            return Ok(None);
        };
        Ok(read_if_exists(&self.path_for(batch_id))
            .await?
            .map(|bytes| (batch_id, bytes)))
    }

    /// Number of archives currently held.
    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index.read().await.is_empty()
    }
}

async fn read_if_exists(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
