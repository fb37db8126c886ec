//! Error types for every stage of a delivery cycle.
//!
//! Only [`FetchError`] and [`StoreError`] can end a cycle early (they surface
//! through [`CycleError`]).  [`SummarizeError`] and [`SendError`] are
//! per-item and are recovered inside the pipeline.

use thiserror::Error;

/// The feed could not be fetched or parsed.  Never a partial list.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned HTTP {status}")]
    Status { status: u16 },

    #[error("failed to parse feed: {0}")]
    Parse(#[from] rss::Error),
}

/// The summarizer did not produce a usable summary.
#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("summarizer returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed summarizer response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("summarizer returned no content")]
    EmptyResponse,
}

/// A message could not be delivered.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("messaging API rejected the message (HTTP {status}): {description}")]
    Rejected { status: u16, description: String },

    #[error("failed to write message: {0}")]
    Io(#[from] std::io::Error),
}

/// The watermark store could not be read or written.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("watermark I/O failed for feed '{feed}': {source}")]
    Io {
        feed: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid feed name '{0}': use ASCII letters, digits, '-' or '_'")]
    InvalidKey(String),
}

/// Why a delivery cycle ended without committing a watermark.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("watermark store failed: {0}")]
    Store(#[from] StoreError),

    #[error("cycle cancelled by shutdown after {attempted} of {total} items")]
    Cancelled { attempted: usize, total: usize },
}
