use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::jobs::JobStore;

/// Runs one retention sweep: every job idle for longer than `retention` is evicted.
pub async fn sweep_expired(store: &JobStore, retention: Duration) -> usize {
    let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
    let cutoff = Utc::now()
        .checked_sub_signed(retention)
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
    store.sweep(cutoff).await
}

/// Spawns the periodic cleanup loop. The first sweep runs after one full interval.
pub fn spawn_sweeper(store: JobStore, retention: Duration, every: Duration) -> JoinHandle<()> {
    info!(
        "Cleanup sweeper running every {}s (retention {}s)",
        every.as_secs(),
        retention.as_secs()
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // interval() fires immediately; skip that tick.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_expired(&store, retention).await;
        }
    })
}
