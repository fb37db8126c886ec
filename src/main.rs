//! feed-relay: relays new RSS items, summarized by an LLM, to a Telegram
//! channel without ever resending what it has already sent.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌──────────┐ items ┌────────────┐ batch ┌────────────────────────────┐
//! │ source/  │ ────► │ sequencer  │ ────► │ pipeline                   │
//! │ (fetch)  │       │ (dedup)    │       │ summarizer → format →      │
//! └──────────┘       └────────────┘       │ messaging → pace → commit  │
//!       ▲                  ▲              └────────────────────────────┘
//!       │                  │ last id                   │
//!  ┌─────────┐       ┌────────────┐                    │
//!  │ poll.rs │       │ watermark  │ ◄──────────────────┘
//!  └─────────┘       └────────────┘
//! ```
//!
//! * **`source/`**: the `DataSource` trait and the RSS implementation.
//! * **`sequencer`**: picks the items newer than the feed's watermark.
//! * **`summarizer`** / **`messaging`**: the LLM and Telegram clients.
//! * **`format`**: builds the Telegram-HTML message, sanitizing markup.
//! * **`pipeline`**: one feed's fetch → deliver → commit cycle.
//! * **`watermark`**: durable per-feed "last delivered id".
//! * **`poll`**: runs cycles for every feed on a timer.
//! * **`main`**: wires everything together: config, logging, shutdown.

mod config;
mod error;
mod format;
mod messaging;
mod pipeline;
mod poll;
mod sequencer;
mod source;
mod summarizer;
#[cfg(test)]
mod testing;
mod watermark;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{Cli, Delivery, Settings};
use messaging::{Messenger, StdoutMessenger, TelegramMessenger};
use pipeline::{DeliveryPipeline, PacingPolicy};
use source::RssSource;
use summarizer::{MistralSummarizer, Summarizer};
use watermark::{FileWatermarkStore, MemoryWatermarkStore, WatermarkStore};

const USER_AGENT: &str = concat!("feed-relay/", env!("CARGO_PKG_VERSION"));

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const SUMMARIZE_TIMEOUT: Duration = Duration::from_secs(30);
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("failed to build HTTP client")
}

/// The file store, or for dry runs an in-memory copy of it so previews start
/// from the persisted position without moving it.
async fn watermark_store(settings: &Settings) -> Result<Arc<dyn WatermarkStore>> {
    let file = FileWatermarkStore::new(&settings.state_dir);
    if !settings.dry_run {
        info!(dir = %file.dir().display(), "using file watermark store");
        return Ok(Arc::new(file));
    }

    let mut snapshot = HashMap::new();
    for feed in &settings.feeds {
        if let Some(id) = file
            .get(&feed.name)
            .await
            .with_context(|| format!("reading watermark for '{}'", feed.name))?
        {
            snapshot.insert(feed.name.clone(), id);
        }
    }
    info!(seeded = snapshot.len(), "dry run: watermarks kept in memory");
    Ok(Arc::new(MemoryWatermarkStore::with_snapshot(snapshot)))
}

fn messenger(settings: &Settings) -> Result<Arc<dyn Messenger>> {
    Ok(match &settings.delivery {
        Delivery::Telegram {
            bot_token,
            channel_id,
        } => Arc::new(TelegramMessenger::new(
            http_client(SEND_TIMEOUT)?,
            bot_token,
            channel_id.clone(),
        )),
        Delivery::Stdout => Arc::new(StdoutMessenger),
    })
}

async fn build_pipelines(settings: &Settings) -> Result<Vec<DeliveryPipeline>> {
    let store = watermark_store(settings).await?;
    let messenger = messenger(settings)?;
    let summarizer: Arc<dyn Summarizer> = Arc::new(MistralSummarizer::new(
        http_client(SUMMARIZE_TIMEOUT)?,
        settings.mistral_api_key.clone(),
        settings.mistral_model.clone(),
    ));
    let fetch_client = http_client(FETCH_TIMEOUT)?;

    Ok(settings
        .feeds
        .iter()
        .map(|feed| {
            info!(feed = %feed.name, url = %feed.url, "relaying feed");
            DeliveryPipeline::new(
                Arc::new(RssSource::new(&feed.name, &feed.url, fetch_client.clone())),
                summarizer.clone(),
                messenger.clone(),
                store.clone(),
                PacingPolicy::new(settings.delay),
            )
            .with_summary_request(settings.summary.clone())
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so clap's `env = ...` fallbacks can see it.
    dotenvy::dotenv().ok();
    init_tracing();

    let settings = Cli::parse().into_settings()?;
    let pipelines = build_pipelines(&settings).await?;

    // -- shutdown on Ctrl-C --------------------------------------------------
    // In-flight batches are abandoned without committing their watermark.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received; shutting down");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
        }
    });

    let rounds = poll::run(&pipelines, settings.schedule, shutdown_rx).await;
    info!(rounds, "feed-relay finished");
    Ok(())
}
