//! Per-feed dedup watermark persistence.
//!
//! A watermark is the id of the last item a feed's cycle processed.  The
//! pipeline reads it once at the start of a cycle and writes it once at the
//! end; see [`crate::pipeline`] for when.  Between the two it holds the
//! feed's lock from the store's [`FeedLocks`], so cycles that share a store
//! never interleave on one feed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::StoreError;

/// Durable key-value store of watermarks, keyed by feed name.
///
/// `get` must never map a read failure to `None`: an unreadable watermark for
/// an existing feed would otherwise look like a bootstrap and resend the
/// whole feed.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn get(&self, feed: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, feed: &str, id: &str) -> Result<(), StoreError>;

    /// Per-feed cycle locks for every pipeline writing through this store.
    fn locks(&self) -> &FeedLocks;
}

/// One async mutex per feed name, created on first use.
#[derive(Debug, Default)]
pub struct FeedLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FeedLocks {
    pub fn for_feed(&self, feed: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.entry(feed.to_string()).or_default().clone()
    }
}

/// Returns `true` if `name` is usable as a feed name / watermark key.
pub fn is_valid_feed_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn check_key(feed: &str) -> Result<(), StoreError> {
    if is_valid_feed_name(feed) {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(feed.to_string()))
    }
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// One small text file per feed: `<dir>/last_<feed>_id.txt`.
///
/// Writes go through a `.tmp` sibling that is fsynced and renamed over the
/// target, so a crash leaves either the old or the new id, never a torn one.
///
/// When a feed has no file yet, `get` falls back to the older
/// `last_hn_<feed>_id.txt` name so existing state directories keep their
/// position.  The next `set` writes the current name, which wins from then on.
pub struct FileWatermarkStore {
    dir: PathBuf,
    locks: FeedLocks,
}

impl FileWatermarkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: FeedLocks::default(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, feed: &str) -> PathBuf {
        self.dir.join(format!("last_{feed}_id.txt"))
    }

    fn legacy_path_for(&self, feed: &str) -> PathBuf {
        self.dir.join(format!("last_hn_{feed}_id.txt"))
    }

    /// `Ok(None)` when the file does not exist.
    async fn read_id(feed: &str, path: &Path) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                let id = contents.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                feed: feed.to_string(),
                source,
            }),
        }
    }
}

#[async_trait]
impl WatermarkStore for FileWatermarkStore {
    async fn get(&self, feed: &str) -> Result<Option<String>, StoreError> {
        check_key(feed)?;
        let path = self.path_for(feed);
        if tokio::fs::try_exists(&path).await.unwrap_or(true) {
            return Self::read_id(feed, &path).await;
        }

        let legacy = self.legacy_path_for(feed);
        let id = Self::read_id(feed, &legacy).await?;
        if id.is_some() {
            debug!(feed, path = %legacy.display(), "watermark read from legacy file");
        }
        Ok(id)
    }

    async fn set(&self, feed: &str, id: &str) -> Result<(), StoreError> {
        check_key(feed)?;
        let io_err = |source: std::io::Error| StoreError::Io {
            feed: feed.to_string(),
            source,
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;

        let path = self.path_for(feed);
        let tmp = path.with_extension("txt.tmp");
        let mut file = tokio::fs::File::create(&tmp).await.map_err(io_err)?;
        file.write_all(id.as_bytes()).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;

        debug!(feed, id, path = %path.display(), "watermark written");
        Ok(())
    }

    fn locks(&self) -> &FeedLocks {
        &self.locks
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Process-local store.  Used for dry runs (seeded from the real store so
/// previews start from the persisted position) and in tests.
#[derive(Default)]
pub struct MemoryWatermarkStore {
    marks: Mutex<HashMap<String, String>>,
    locks: FeedLocks,
}

impl MemoryWatermarkStore {
    pub fn with_snapshot(snapshot: HashMap<String, String>) -> Self {
        Self {
            marks: Mutex::new(snapshot),
            locks: FeedLocks::default(),
        }
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn get(&self, feed: &str) -> Result<Option<String>, StoreError> {
        check_key(feed)?;
        let marks = self.marks.lock().unwrap_or_else(|p| p.into_inner());
        Ok(marks.get(feed).cloned())
    }

    async fn set(&self, feed: &str, id: &str) -> Result<(), StoreError> {
        check_key(feed)?;
        let mut marks = self.marks.lock().unwrap_or_else(|p| p.into_inner());
        marks.insert(feed.to_string(), id.to_string());
        Ok(())
    }

    fn locks(&self) -> &FeedLocks {
        &self.locks
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
