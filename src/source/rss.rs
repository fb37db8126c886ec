//! RSS feed source implementation.
//!
//! This module shows how to implement the [`DataSource`] trait for a concrete
//! feed format.  Use it as a template when adding support for Atom, JSON Feed,
//! or any other format.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{debug, warn};

use super::{DataSource, FeedItem};
use crate::error::FetchError;

/// An RSS feed data source.
///
/// Fetches and parses an RSS 2.0 feed over HTTP using the [`rss`] crate.
pub struct RssSource {
    /// Feed name; also the watermark key.
    pub name: String,
    /// The feed URL to poll.
    pub url: String,
    client: Client,
}

impl RssSource {
    /// Create a new RSS source sharing an existing HTTP client.
    ///
    /// # Arguments
    ///
    /// * `name`: feed name (e.g. `frontpage`).
    /// * `url`: full URL of the RSS feed (e.g. `https://hnrss.org/frontpage`).
    /// * `client`: HTTP client; its timeout bounds the fetch.
    pub fn new(name: impl Into<String>, url: impl Into<String>, client: Client) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client,
        }
    }

    /// Parse an already-fetched [`rss::Channel`] into [`FeedItem`]s.
    ///
    /// This is a pure function (no I/O) so that tests can exercise the
    /// parsing logic without hitting the network.  Channel order is kept.
    pub fn parse_channel(channel: &rss::Channel) -> Vec<FeedItem> {
        channel
            .items()
            .iter()
            .filter_map(|item| {
                // Prefer <guid>, fall back to <link>.  Without either the
                // item cannot be deduplicated, so it is dropped.
                let id = item
                    .guid()
                    .map(|g| g.value().trim().to_string())
                    .filter(|g| !g.is_empty())
                    .or_else(|| item.link().map(|l| l.trim().to_string()))
                    .filter(|id| !id.is_empty());

                let Some(id) = id else {
                    warn!(title = item.title().unwrap_or(""), "dropping item with no guid or link");
                    return None;
                };

                // Parse RFC-2822 date; gracefully degrade to None on failure.
                let published = item
                    .pub_date()
                    .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
                    .map(|dt| dt.with_timezone(&Utc));

                Some(FeedItem {
                    id,
                    title: item.title().unwrap_or("(untitled)").to_string(),
                    body: item.description().map(String::from),
                    link: item.link().unwrap_or_default().to_string(),
                    published,
                })
            })
            .collect()
    }
}

#[async_trait]
impl DataSource for RssSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<FeedItem>, FetchError> {
        let resp = self.client.get(&self.url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        let body = resp.bytes().await?;
        let channel = rss::Channel::read_from(body.as_ref())?;
        let items = Self::parse_channel(&channel);
        debug!(feed = %self.name, count = items.len(), "fetched feed");
        Ok(items)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
