//! The delivery cycle for one feed.
//!
//! ```text
//! FETCHING → SEQUENCING → (per item: SUMMARIZING → FORMATTING → SENDING → PACING)
//!          → COMMITTING → DONE
//! ```
//!
//! The watermark tracks processing progress, not confirmed delivery: once a
//! batch has been attempted, the watermark moves to its last id even if some
//! sends failed.  A send that keeps failing is therefore dropped rather than
//! retried forever.  A crash or shutdown mid-batch commits nothing, so the
//! next run redelivers the batch (at-least-once).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::CycleError;
use crate::format::format_message;
use crate::messaging::Messenger;
use crate::sequencer::{sequence, Boundary};
use crate::source::DataSource;
use crate::summarizer::{SummaryRequest, Summarizer};
use crate::watermark::WatermarkStore;

/// Delay inserted between consecutive sends of one batch, to stay under the
/// messaging API's rate limit.  Nothing is inserted after the last item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    pub delay: Duration,
}

impl PacingPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

/// Outcome of a cycle that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub feed: String,
    /// Items returned by the source.
    pub fetched: usize,
    /// Items selected for delivery.
    pub batch: usize,
    /// Sends that succeeded.
    pub delivered: usize,
    pub send_failures: usize,
    pub summarize_failures: usize,
    /// How the batch boundary was found.
    pub boundary: Boundary,
    /// Watermark after the cycle (unchanged when the batch was empty).
    pub watermark: Option<String>,
}

/// Runs delivery cycles for a single feed.
///
/// Collaborators are injected so that tests (and dry runs) can swap any of
/// them.  Cycles for one feed name are serialized through the store's
/// [`FeedLocks`](crate::watermark::FeedLocks): a second `run_cycle` for the
/// same feed, from this pipeline or another one sharing the store, waits
/// until the first has committed or bailed out.
pub struct DeliveryPipeline {
    source: Arc<dyn DataSource>,
    summarizer: Arc<dyn Summarizer>,
    messenger: Arc<dyn Messenger>,
    store: Arc<dyn WatermarkStore>,
    pacing: PacingPolicy,
    request: SummaryRequest,
}

impl DeliveryPipeline {
    pub fn new(
        source: Arc<dyn DataSource>,
        summarizer: Arc<dyn Summarizer>,
        messenger: Arc<dyn Messenger>,
        store: Arc<dyn WatermarkStore>,
        pacing: PacingPolicy,
    ) -> Self {
        Self {
            source,
            summarizer,
            messenger,
            store,
            pacing,
            request: SummaryRequest::default(),
        }
    }

    pub fn with_summary_request(mut self, request: SummaryRequest) -> Self {
        self.request = request;
        self
    }

    pub fn feed_name(&self) -> &str {
        self.source.name()
    }

    /// Run one fetch → deliver → commit pass.
    ///
    /// Returns `Err` only when nothing was committed: the fetch or the store
    /// failed, or `shutdown` turned `true` before the batch finished.
    /// Summarizer and send failures are counted in the report instead.
    pub async fn run_cycle(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<CycleReport, CycleError> {
        let lock = self.store.locks().for_feed(self.feed_name());
        let _guard = lock.lock().await;
        let span = info_span!("cycle", feed = %self.feed_name());
        self.cycle(shutdown).instrument(span).await
    }

    async fn cycle(&self, mut shutdown: watch::Receiver<bool>) -> Result<CycleReport, CycleError> {
        let feed = self.feed_name();

        let watermark = self.store.get(feed).await?;
        debug!(watermark = ?watermark, "fetching");

        let items = self.source.fetch().await.map_err(|e| {
            warn!(error = %e, "fetch failed; watermark untouched");
            e
        })?;
        let fetched = items.len();

        let batch = sequence(items, watermark.as_deref());
        match batch.boundary {
            Boundary::Stale => warn!(
                watermark = ?watermark,
                count = batch.len(),
                "watermark not in feed; treating whole fetch as new"
            ),
            Boundary::Bootstrap if !batch.is_empty() => {
                info!(count = batch.len(), "no watermark yet; delivering current snapshot")
            }
            _ => {}
        }

        let mut report = CycleReport {
            feed: feed.to_string(),
            fetched,
            batch: batch.len(),
            delivered: 0,
            send_failures: 0,
            summarize_failures: 0,
            boundary: batch.boundary,
            watermark: watermark.clone(),
        };

        let Some(last_id) = batch.last_id().map(str::to_string) else {
            info!(fetched, "no new entries");
            return Ok(report);
        };

        let total = batch.len();
        for (idx, item) in batch.items.iter().enumerate() {
            if *shutdown.borrow() {
                return Err(cancelled(idx, total));
            }

            debug!(id = %item.id, "summarizing");
            let summary = match self
                .summarizer
                .summarize(
                    &item.summary_input(),
                    &self.request.system_prompt,
                    self.request.max_output_tokens,
                )
                .await
            {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!(id = %item.id, error = %e, "summary failed; sending without one");
                    report.summarize_failures += 1;
                    None
                }
            };

            let message = format_message(item, summary.as_deref());

            match self.messenger.send(&message).await {
                Ok(()) => {
                    report.delivered += 1;
                    info!(id = %item.id, title = %item.title, published = ?item.published, "sent");
                }
                Err(e) => {
                    report.send_failures += 1;
                    warn!(id = %item.id, title = %item.title, error = %e, "send failed; not retried");
                }
            }

            if idx + 1 < total {
                debug!(delay = ?self.pacing.delay, "pacing");
                if self.pause(&mut shutdown).await {
                    return Err(cancelled(idx + 1, total));
                }
            }
        }

        self.store.set(feed, &last_id).await?;
        info!(
            watermark = %last_id,
            delivered = report.delivered,
            failed = report.send_failures,
            "watermark advanced"
        );
        report.watermark = Some(last_id);
        Ok(report)
    }

    /// Sleep for the pacing delay.  Returns `true` if shutdown was requested
    /// before it elapsed.
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let interrupted = tokio::select! {
            _ = tokio::time::sleep(self.pacing.delay) => false,
            _ = shutdown_requested(shutdown) => true,
        };
        interrupted || *shutdown.borrow()
    }
}

fn cancelled(attempted: usize, total: usize) -> CycleError {
    warn!(attempted, total, "shutdown requested; abandoning batch without commit");
    CycleError::Cancelled { attempted, total }
}

/// Resolves once the flag is `true`.  A dropped sender means nobody can ask
/// for shutdown any more, so that never resolves.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let closed = shutdown.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
