use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::{debug, warn};

use crate::engine::QuotaEngine;
use crate::error::QuotaResult;

/// key: quota-retention-scheduler -> periodic history purge
pub fn spawn(engine: QuotaEngine, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = process_tick(&engine).await {
                warn!(?err, "listing quota retention tick failed");
            }
        }
    })
}

/// key: quota-retention-scheduler -> tick handler
pub async fn process_tick(engine: &QuotaEngine) -> QuotaResult<u64> {
    let deleted = engine.cleanup_old_quotas().await?;
    if deleted == 0 {
        debug!("no listing quotas past the retention horizon");
    }
    Ok(deleted)
}
