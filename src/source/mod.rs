//! Data source abstraction layer.
//!
//! This module defines the [`DataSource`] trait and the common [`FeedItem`]
//! type.  Concrete source implementations live in sub-modules (currently only
//! [`rss`]).
//!
//! ## For contributors: adding a new source
//!
//! 1. Create a new file in this directory (e.g. `atom.rs`).
//! 2. Define a struct (e.g. `AtomSource`) and implement [`DataSource`] for it.
//! 3. Add `mod atom;` below and re-export your struct in the `pub use` block.
//! 4. Construct an instance in `build_pipelines` in `main.rs`, where each
//!    configured feed gets its pipeline.
//!
//! The sequencer, formatter and delivery pipeline are all source-agnostic.

mod feed_item;
mod rss;

pub use feed_item::FeedItem;
pub use rss::RssSource;

use async_trait::async_trait;

use crate::error::FetchError;

/// Trait that every data source must implement.
///
/// The pipeline calls [`fetch()`](DataSource::fetch) once per cycle from a
/// tokio task, so implementations must be `Send + Sync`.
///
/// ## Contract
///
/// * Items come back **newest first**, in the order the source publishes
///   them.  The sequencer relies on this and never re-sorts.
/// * A failure is an error, never a partial list.
///
/// ```ignore
/// pub struct MySource { /* config fields */ }
///
/// #[async_trait]
/// impl DataSource for MySource {
///     fn name(&self) -> &str { "my-source" }
///
///     async fn fetch(&self) -> Result<Vec<FeedItem>, FetchError> {
///         // Perform HTTP / IO, then convert into FeedItem values.
///         todo!()
///     }
/// }
/// ```
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Feed name.  Doubles as the watermark key.
    fn name(&self) -> &str;

    /// Fetch the current snapshot of the feed, newest first.
    async fn fetch(&self) -> Result<Vec<FeedItem>, FetchError>;
}
