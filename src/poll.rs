//! Feed polling loop.
//!
//! Runs one delivery cycle per configured feed, one feed after another, then
//! sleeps until the next round.  Feeds share the messaging channel and its
//! rate limit, so they are not run in parallel.
//!
//! ## For contributors
//!
//! A failing feed only costs its own cycle: the error is logged and the next
//! feed still runs.  Shutdown interrupts both pacing (inside the pipeline)
//! and the sleep between rounds.

use tokio::sync::watch;
use tracing::{error, info};

use crate::config::Schedule;
use crate::error::CycleError;
use crate::pipeline::{shutdown_requested, DeliveryPipeline};

/// Run rounds until `schedule` is exhausted or shutdown is requested.
///
/// Returns the number of rounds started.
pub async fn run(
    pipelines: &[DeliveryPipeline],
    schedule: Schedule,
    mut shutdown: watch::Receiver<bool>,
) -> usize {
    let mut rounds = 0;

    loop {
        rounds += 1;
        for pipeline in pipelines {
            if *shutdown.borrow() {
                return rounds;
            }

            match pipeline.run_cycle(shutdown.clone()).await {
                Ok(report) => info!(
                    feed = %report.feed,
                    fetched = report.fetched,
                    new = report.batch,
                    delivered = report.delivered,
                    send_failures = report.send_failures,
                    summarize_failures = report.summarize_failures,
                    boundary = ?report.boundary,
                    watermark = ?report.watermark,
                    "cycle complete"
                ),
                Err(CycleError::Cancelled { .. }) => return rounds,
                Err(e) => error!(feed = %pipeline.feed_name(), error = %e, "cycle failed"),
            }
        }

        let Schedule::Every(interval) = schedule else {
            return rounds;
        };

        info!(interval = ?interval, "round finished; sleeping");
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown_requested(&mut shutdown) => {
                info!("shutdown requested; stopping poller");
                return rounds;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
