//! The core data type shared across all feed sources.
//!
//! `FeedItem` represents a single entry from any data source.  Every source
//! implementation converts its native format into `FeedItem`s so the
//! sequencer and the delivery pipeline can stay source-agnostic.
//!
//! ## Ordering
//!
//! Unlike a reader, the relay never re-sorts items.  The order a source
//! returns (newest first) is the order the sequencer trusts, so `FeedItem`
//! deliberately has no `Ord` impl.

use chrono::{DateTime, Utc};

/// A single feed entry, normalised from any data source.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FeedItem {
    /// Identity used for de-duplication and as the watermark value.
    ///
    /// For RSS this is the `<guid>` element (falling back to `<link>`).
    pub id: String,

    /// Headline.  May contain markup; the formatter sanitizes it.
    pub title: String,

    /// Optional longer description, fed to the summarizer.
    pub body: Option<String>,

    /// URL to the full content.
    pub link: String,

    /// Publication timestamp, when the source provides one.  Only logged.
    pub published: Option<DateTime<Utc>>,
}

impl FeedItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: None,
            link: link.into(),
            published: None,
        }
    }

    #[cfg(test)]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Text handed to the summarizer: the title, a newline, then the body
    /// (empty when the item has none).
    pub fn summary_input(&self) -> String {
        format!("{}\n{}", self.title, self.body.as_deref().unwrap_or(""))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_input_joins_title_and_body() {
        let item = FeedItem::new("1", "Show HN: A thing", "https://example.com/1")
            .with_body("It does stuff.");
        assert_eq!(item.summary_input(), "Show HN: A thing\nIt does stuff.");
    }

    #[test]
    fn summary_input_without_body_keeps_separator() {
        let item = FeedItem::new("1", "Ask HN: Why?", "https://example.com/1");
        assert_eq!(item.summary_input(), "Ask HN: Why?\n");
    }

    #[test]
    fn equality_is_field_wise() {
        let a = FeedItem::new("x", "T", "https://example.com");
        let b = a.clone().with_body("different");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }
}
