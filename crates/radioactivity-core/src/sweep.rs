//! Periodic decay sweep.
//!
//! Reads decay lazily, so the sweep is not needed for correctness. It
//! keeps stored values close to their effective value and reclaims scores
//! that have sat at zero for longer than the retention window.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::aggregator::Aggregator;

/// Run [`Aggregator::sweep`] every `interval` until `shutdown` turns
/// `true` or its sender is dropped.
pub async fn run_sweeper(
    aggregator: Arc<Aggregator>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; skip it so the first sweep
    // happens one interval after startup.
    ticker.tick().await;

    info!(interval_secs = interval.as_secs(), "Sweeper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // The aggregator logs the report itself.
                if let Err(e) = aggregator.sweep(Utc::now()).await {
                    warn!(error = %e, "Sweep skipped, store unavailable");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("Sweeper stopped");
}
