//! Decides which fetched items are new, and in what order to deliver them.
//!
//! Sources return items newest first.  The sequencer walks that list until
//! it reaches the watermark and hands back everything before it, reversed,
//! so the last item delivered is always the newest one.  That is what lets
//! the pipeline commit "id of the last item in the batch" as the watermark.

use crate::source::FeedItem;

/// Which rule selected the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// No watermark yet: the whole current snapshot is new.
    Bootstrap,
    /// The watermark was found; only items above it are new.
    Resumed,
    /// The watermark is no longer in the feed (it aged out of the source's
    /// retention window).  The whole fetch is treated as new, which can
    /// resend items seen shortly before the watermark fell off.
    Stale,
}

/// Chronologically ordered (oldest first) items to deliver this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryBatch {
    pub items: Vec<FeedItem>,
    pub boundary: Boundary,
}

impl DeliveryBatch {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Id the watermark moves to once the batch has been attempted.
    pub fn last_id(&self) -> Option<&str> {
        self.items.last().map(|item| item.id.as_str())
    }
}

/// Select the items newer than `watermark` from a newest-first `items`.
///
/// * `watermark == None` → everything, oldest first.
/// * watermark found → items strictly newer than it, oldest first.
/// * watermark not found → everything, oldest first ([`Boundary::Stale`]).
///   An empty fetch is not stale: there is nothing to resume past.
pub fn sequence(items: Vec<FeedItem>, watermark: Option<&str>) -> DeliveryBatch {
    let Some(mark) = watermark else {
        return DeliveryBatch {
            items: items.into_iter().rev().collect(),
            boundary: Boundary::Bootstrap,
        };
    };

    let (mut fresh, boundary) = match items.iter().position(|item| item.id == mark) {
        Some(pos) => {
            let mut items = items;
            items.truncate(pos);
            (items, Boundary::Resumed)
        }
        None if items.is_empty() => (items, Boundary::Resumed),
        None => (items, Boundary::Stale),
    };
    fresh.reverse();

    DeliveryBatch {
        items: fresh,
        boundary,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
