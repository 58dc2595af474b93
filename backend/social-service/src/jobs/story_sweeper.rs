//! Expired story sweeper
//!
//! Stories stop being visible once `expires_at` passes, whether or not this
//! job has run. The sweeper only reclaims their rows, along with the views,
//! comments and likes attached to them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::time::sleep;

use crate::error::AppResult;
use crate::metrics;
use crate::repository::ContentStore;

/// Remove every story expired at `now`
pub async fn sweep_once(store: &dyn ContentStore, now: DateTime<Utc>) -> AppResult<u64> {
    let deleted = store.purge_expired_stories(now).await?;
    metrics::record_story_sweep(deleted);
    Ok(deleted)
}

pub async fn run(store: Arc<dyn ContentStore>, interval: Duration) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        "Starting story sweeper"
    );

    loop {
        sleep(interval).await;

        let cycle_start = Instant::now();
        match sweep_once(store.as_ref(), Utc::now()).await {
            Ok(0) => tracing::debug!("Story sweep found nothing to delete"),
            Ok(deleted) => tracing::info!(
                deleted,
                duration_ms = cycle_start.elapsed().as_millis(),
                "Expired stories deleted"
            ),
            Err(e) => tracing::error!(error = %e, "Story sweep failed"),
        }
    }
}
