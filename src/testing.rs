//! In-process fakes for the four pipeline collaborators.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{FetchError, SendError, StoreError, SummarizeError};
use crate::messaging::Messenger;
use crate::source::{DataSource, FeedItem};
use crate::summarizer::Summarizer;
use crate::watermark::{FeedLocks, MemoryWatermarkStore, WatermarkStore};

/// Newest-first items with ids `ids`, titled `Item <id>`.
pub fn items(ids: &[&str]) -> Vec<FeedItem> {
    ids.iter()
        .map(|id| {
            FeedItem::new(*id, format!("Item {id}"), format!("https://example.com/{id}"))
                .with_body(format!("body {id}"))
        })
        .collect()
}

/// Serves a snapshot that tests can swap between cycles; `None` fails.
pub struct FakeSource {
    name: String,
    snapshot: Mutex<Option<Vec<FeedItem>>>,
    fetches: AtomicUsize,
}

impl FakeSource {
    pub fn named(name: &str, ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            snapshot: Mutex::new(Some(items(ids))),
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn with_ids(ids: &[&str]) -> Arc<Self> {
        Self::named("frontpage", ids)
    }

    pub fn failing(name: &str) -> Arc<Self> {
        let source = Self::named(name, &[]);
        *source.snapshot.lock().unwrap() = None;
        source
    }

    pub fn set_ids(&self, ids: &[&str]) {
        *self.snapshot.lock().unwrap() = Some(items(ids));
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for FakeSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<FeedItem>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.snapshot
            .lock()
            .unwrap()
            .clone()
            .ok_or(FetchError::Status { status: 503 })
    }
}

/// Returns `summary of <title>`, or fails for the listed titles.
#[derive(Default)]
pub struct FakeSummarizer {
    pub fail_for: Vec<String>,
    pub calls: Mutex<Vec<(String, String, u32)>>,
}

impl FakeSummarizer {
    pub fn failing_for(titles: &[&str]) -> Self {
        Self {
            fail_for: titles.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(
        &self,
        text: &str,
        system_prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, SummarizeError> {
        self.calls.lock().unwrap().push((
            text.to_string(),
            system_prompt.to_string(),
            max_output_tokens,
        ));
        let title = text.lines().next().unwrap_or_default();
        if self.fail_for.iter().any(|t| t == title) {
            return Err(SummarizeError::EmptyResponse);
        }
        Ok(format!("summary of {title}"))
    }
}

/// Records every message and when it was sent.
#[derive(Default)]
pub struct RecordingMessenger {
    fail_all: bool,
    pub sent: Mutex<Vec<(Instant, String)>>,
}

impl RecordingMessenger {
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn send_times(&self) -> Vec<Instant> {
        self.sent.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    /// Bold titles of sent messages, in order.
    pub fn titles(&self) -> Vec<String> {
        self.messages()
            .iter()
            .map(|m| {
                m.trim_start_matches("<b>")
                    .split("</b>")
                    .next()
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, text: &str) -> Result<(), SendError> {
        self.sent
            .lock()
            .unwrap()
            .push((Instant::now(), text.to_string()));
        if self.fail_all {
            return Err(SendError::Rejected {
                status: 429,
                description: "Too Many Requests".into(),
            });
        }
        Ok(())
    }
}

/// Memory store that counts writes.
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryWatermarkStore,
    writes: AtomicUsize,
}

impl CountingStore {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WatermarkStore for CountingStore {
    async fn get(&self, feed: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(feed).await
    }

    async fn set(&self, feed: &str, id: &str) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set(feed, id).await
    }

    fn locks(&self) -> &FeedLocks {
        self.inner.locks()
    }
}

/// Memory store whose reads and writes can be switched to failing.
#[derive(Default)]
pub struct BrokenStore {
    inner: MemoryWatermarkStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl BrokenStore {
    /// Every read and write fails.
    pub fn unreadable() -> Arc<Self> {
        let store = Arc::new(Self::default());
        store.fail_reads.store(true, Ordering::SeqCst);
        store.fail_writes.store(true, Ordering::SeqCst);
        store
    }

    /// Reads work; writes fail.
    pub fn unwritable() -> Arc<Self> {
        let store = Arc::new(Self::default());
        store.fail_writes.store(true, Ordering::SeqCst);
        store
    }

    pub fn repair(&self) {
        self.fail_reads.store(false, Ordering::SeqCst);
        self.fail_writes.store(false, Ordering::SeqCst);
    }

    fn denied(feed: &str) -> StoreError {
        StoreError::Io {
            feed: feed.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        }
    }
}

#[async_trait]
impl WatermarkStore for BrokenStore {
    async fn get(&self, feed: &str) -> Result<Option<String>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Self::denied(feed));
        }
        self.inner.get(feed).await
    }

    async fn set(&self, feed: &str, id: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::denied(feed));
        }
        self.inner.set(feed, id).await
    }

    fn locks(&self) -> &FeedLocks {
        self.inner.locks()
    }
}
