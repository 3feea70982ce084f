//! On-disk frame store.
//!
//! Layout under the data root:
//!
//! ```text
//! frames/<category_id>/<N>.jpg   stored frames, N sequential per category
//! temp/data/attempt-<K>/         downloaded segments of one ingestion attempt
//! temp/recognition/              scratch frames for recognition consumers
//! debug/<N>.ts                   segments that failed to decode
//! ```
//!
//! Frame numbers come from a directory scan, so only one writer may assign
//! numbers in a category at a time. [`FrameStore::lock_category`] hands out
//! that per-category lock.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::database::models::frame_number_of;
use crate::database::repositories::OnDiskIndex;
use crate::{Error, Result};
use crate::utils::fs::{dir_size, ensure_dir_all, ensure_dir_all_with_op, io_error};

/// File extension of stored frames.
pub const FRAME_EXTENSION: &str = "jpg";
/// File extension of archived debug segments.
pub const DEBUG_EXTENSION: &str = "ts";

/// Scratch areas emptied after every ingestion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempArea {
    /// Downloaded segment bodies.
    Data,
    /// Frames kept only for recognition consumers.
    Recognition,
}

impl TempArea {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Recognition => "recognition",
        }
    }
}

pub struct FrameStore {
    root: PathBuf,
    writers: DashMap<String, Arc<Mutex<()>>>,
    attempts: AtomicU64,
}

impl FrameStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            writers: DashMap::new(),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join("frames")
    }

    pub fn category_dir(&self, category_id: &str) -> PathBuf {
        self.frames_dir().join(category_id)
    }

    pub fn temp_dir(&self, area: TempArea) -> PathBuf {
        self.root.join("temp").join(area.dir_name())
    }

    pub fn debug_dir(&self) -> PathBuf {
        self.root.join("debug")
    }

    /// Create every directory of the layout.
    pub async fn ensure_layout(&self) -> Result<()> {
        ensure_dir_all_with_op("creating data root", &self.root).await?;
        for dir in [
            self.frames_dir(),
            self.temp_dir(TempArea::Data),
            self.temp_dir(TempArea::Recognition),
            self.debug_dir(),
        ] {
            ensure_dir_all(&dir).await?;
        }
        Ok(())
    }

    /// Exclusive right to assign frame numbers in `category_id`.
    pub async fn lock_category(&self, category_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .writers
            .entry(category_id.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Next frame number in `category_id` (`max + 1`, or 1 if empty).
    pub async fn next_frame_number(&self, category_id: &str) -> Result<u64> {
        next_number_in(&self.category_dir(category_id)).await
    }

    /// Write frame `number` of `category_id` and return the path relative to
    /// `frames/`.
    ///
    /// The bytes land in a `.part` file first and are renamed into place, so
    /// a frame file is either complete or absent.
    pub async fn write_frame(&self, category_id: &str, number: u64, bytes: &[u8]) -> Result<String> {
        let dir = self.category_dir(category_id);
        ensure_dir_all_with_op("creating category directory", &dir).await?;

        let file_name = format!("{number}.{FRAME_EXTENSION}");
        let path = dir.join(&file_name);
        let part = dir.join(format!("{file_name}.part"));

        tokio::fs::write(&part, bytes)
            .await
            .map_err(|e| io_error("writing frame", &part, e))?;
        tokio::fs::rename(&part, &path)
            .await
            .map_err(|e| io_error("renaming frame", &path, e))?;

        Ok(format!("{category_id}/{file_name}"))
    }

    /// Remove a stored frame by its relative path. A missing file is not an error.
    pub async fn remove_frame(&self, relative_path: &str) -> Result<()> {
        let path = self.frames_dir().join(relative_path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("removing frame", &path, e)),
        }
    }

    /// Delete everything under a scratch area. Returns the number of entries
    /// removed; an empty or missing area yields 0.
    pub async fn purge_temp(&self, area: TempArea) -> Result<usize> {
        let dir = self.temp_dir(area);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_error("reading temp directory", &dir, e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error("reading temp directory", &dir, e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| io_error("inspecting", &path, e))?;
            let result = if file_type.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_error("removing temp entry", &path, e)),
            }
        }

        if removed > 0 {
            debug!(area = ?area, removed, "Purged temp area");
        }
        Ok(removed)
    }

    /// Create a scratch directory in `area` owned by a single attempt.
    /// Concurrent attempts never share one, so each can clean up its own
    /// without touching files another is still decoding.
    pub async fn create_scratch(&self, area: TempArea) -> Result<PathBuf> {
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        let dir = self.temp_dir(area).join(format!("attempt-{attempt}"));
        ensure_dir_all_with_op("creating scratch directory", &dir).await?;
        Ok(dir)
    }

    /// Remove a directory made by [`FrameStore::create_scratch`]. Missing is fine.
    pub async fn remove_scratch(&self, dir: &Path) -> Result<()> {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("removing scratch directory", dir, e)),
        }
    }

    /// Keep the raw bytes of a segment that failed to decode. Returns the
    /// archive path.
    pub async fn archive_debug_segment(&self, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self.debug_dir();
        ensure_dir_all_with_op("creating debug directory", &dir).await?;

        let number = next_number_in(&dir).await?;
        let path = dir.join(format!("{number}.{DEBUG_EXTENSION}"));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| io_error("archiving segment", &path, e))?;
        Ok(path)
    }

    /// File names present in every category directory under `frames/`.
    pub async fn on_disk_index(&self) -> Result<OnDiskIndex> {
        let frames_dir = self.frames_dir();
        let mut index = OnDiskIndex::new();

        let mut categories = match tokio::fs::read_dir(&frames_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(index),
            Err(e) => return Err(io_error("reading frames directory", &frames_dir, e)),
        };

        while let Some(category) = categories
            .next_entry()
            .await
            .map_err(|e| io_error("reading frames directory", &frames_dir, e))?
        {
            let category_path = category.path();
            let is_dir = category
                .file_type()
                .await
                .map_err(|e| io_error("inspecting", &category_path, e))?
                .is_dir();
            let Some(category_id) = category.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !is_dir {
                continue;
            }

            let mut files = HashSet::new();
            let mut entries = tokio::fs::read_dir(&category_path)
                .await
                .map_err(|e| io_error("reading category directory", &category_path, e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| io_error("reading category directory", &category_path, e))?
            {
                if let Some(name) = entry.file_name().to_str() {
                    files.insert(name.to_string());
                }
            }
            index.insert(category_id, files);
        }

        Ok(index)
    }

    /// Total bytes stored under `frames/`.
    pub async fn frames_size(&self) -> Result<u64> {
        dir_size(&self.frames_dir()).await
    }
}

/// `max + 1` over the positive integer file stems in `dir`; 1 if there are
/// none or `dir` does not exist.
pub async fn next_number_in(dir: &Path) -> Result<u64> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(1),
        Err(e) => return Err(io_error("reading directory", dir, e)),
    };

    let mut max = 0u64;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| io_error("reading directory", dir, e))?
    {
        if let Some(number) = entry.file_name().to_str().and_then(frame_number_of) {
            max = max.max(number);
        }
    }
    max.checked_add(1).ok_or_else(|| {
        Error::validation(format!(
            "frame numbers exhausted in {}",
            dir.display()
        ))
    })
}
