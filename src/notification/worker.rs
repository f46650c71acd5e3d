use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::SimConfig;
use crate::db::Db;

use super::queue::{self, Notification};

pub const TICK_SECS: u64 = 5;
pub const BATCH_SIZE: u32 = 10;

/// Background delivery loop: every tick, drain up to `BATCH_SIZE`
/// queued notifications in priority order and walk each through the
/// simulated delivery lifecycle.
pub fn spawn(db: Db, sim: SimConfig, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(TICK_SECS));
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(err) = run_batch(&db, &sim).await {
                        tracing::error!("notification worker batch failed: {err:#}");
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("notification worker stopping");
                    break;
                }
            }
        }
    })
}

async fn run_batch(db: &Db, sim: &SimConfig) -> anyhow::Result<()> {
    let batch = {
        let conn = db.lock().await;
        queue::fetch_batch(&conn, BATCH_SIZE)?
    };

    for notification in batch {
        deliver(db, sim, notification).await?;
    }
    Ok(())
}

async fn deliver(db: &Db, sim: &SimConfig, notification: Notification) -> anyhow::Result<()> {
    tokio::time::sleep(Duration::from_millis(sim.delivery_delay_ms)).await;
    {
        let conn = db.lock().await;
        queue::mark_sent(&conn, &notification.id)?;
    }

    tokio::time::sleep(Duration::from_millis(sim.final_delay_ms)).await;

    let failed = rand::rng().random_range(0..100) < sim.failure_rate_percent;
    if !failed {
        let conn = db.lock().await;
        queue::mark_delivered(&conn, &notification.id)?;
        return Ok(());
    }

    let reason = format!(
        "simulated {} delivery failure (attempt {})",
        notification.channel,
        notification.retry_count + 1
    );
    {
        let conn = db.lock().await;
        queue::mark_failed(&conn, &notification.id, &reason)?;
    }
    tracing::warn!(
        notification = %notification.id,
        retry_count = notification.retry_count,
        "delivery failed: {reason}"
    );

    if notification.retry_count < sim.max_retry_attempts {
        // Exponential backoff on a detached timer so one failing
        // notification never stalls the rest of the batch.
        let backoff = Duration::from_millis(
            sim.retry_delay_ms
                .saturating_mul(1u64 << notification.retry_count.min(16)),
        );
        let db = db.clone();
        let id = notification.id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(backoff).await;
            let conn = db.lock().await;
            if let Err(err) = queue::requeue(&conn, &id) {
                tracing::error!("requeue of {id} failed: {err}");
            }
        });
    }

    Ok(())
}
