//! Periodic background work.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use scriptshop_store::{Database, StoreError};

use crate::rate_limit::RateLimiter;

/// Delete every ad whose expiry has passed. Shared by the cleanup endpoint
/// and the interval task.
pub fn cleanup_expired_ads(db: &Database) -> Result<u64, StoreError> {
    let removed = db.delete_expired_ads(Utc::now())?;
    if removed > 0 {
        info!(removed, "Removed expired ads");
    } else {
        debug!("No expired ads");
    }
    Ok(removed)
}

/// Run [`cleanup_expired_ads`] every `interval_secs`; `None` when disabled.
pub fn spawn_ad_cleanup(db: Arc<Mutex<Database>>, interval_secs: u64) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        info!("In-process ad cleanup disabled");
        return None;
    }
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            let result = {
                let db = db.lock().await;
                cleanup_expired_ads(&db)
            };
            if let Err(e) = result {
                warn!(error = %e, "Ad cleanup failed");
            }
        }
    }))
}

/// Every 5 minutes, evict rate-limit buckets idle for more than 10.
pub fn spawn_rate_limit_purge(limiter: RateLimiter) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let purged = limiter.purge_stale(600.0).await;
            if purged > 0 {
                debug!(purged, "Purged idle rate-limit buckets");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use scriptshop_store::NewAd;

    fn ad(expires_in: ChronoDuration) -> NewAd {
        NewAd {
            title: "Banner".into(),
            content: "Sale".into(),
            image_url: None,
            expires_at: Utc::now() + expires_in,
        }
    }

    #[test]
    fn nothing_expired_is_a_successful_zero() {
        let db = Database::open_in_memory().unwrap();
        db.create_ad(&ad(ChronoDuration::days(1))).unwrap();
        assert_eq!(cleanup_expired_ads(&db).unwrap(), 0);
        assert_eq!(db.list_ads().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn interval_task_removes_expired_ads() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        db.lock()
            .await
            .create_ad(&ad(ChronoDuration::days(-1)))
            .unwrap();

        let handle = spawn_ad_cleanup(db.clone(), 3600).unwrap();
        // The first tick fires immediately.
        for _ in 0..50 {
            if db.lock().await.list_ads().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();
        assert!(db.lock().await.list_ads().unwrap().is_empty());
    }

    #[test]
    fn zero_interval_disables_the_task() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
            assert!(spawn_ad_cleanup(db, 0).is_none());
        });
    }
}
