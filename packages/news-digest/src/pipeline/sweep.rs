//! Periodic TTL eviction.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::error::Result;
use crate::traits::store::CacheStore;
use crate::types::config::{ExpiryPolicy, ExpiryReport};

/// Run one sweep over summaries and translations. Translations share the
/// long retention window.
pub async fn run_expiry(store: &dyn CacheStore, policy: &ExpiryPolicy) -> Result<ExpiryReport> {
    let mut report = store.expire_summaries(policy).await?;
    report.translations = store.expire_translations(policy.long_ttl).await?;
    info!(
        long = report.long,
        short = report.short,
        translations = report.translations,
        "Expired cache entries"
    );
    Ok(report)
}

/// Sweep every `every` until the handle is aborted. The first sweep runs
/// immediately; a sweep that overruns delays the next one rather than
/// overlapping it.
pub fn spawn_expiry_sweep(store: Arc<dyn CacheStore>, policy: ExpiryPolicy, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Err(e) = run_expiry(store.as_ref(), &policy).await {
                warn!(error = %e, "Expiry sweep failed");
            }
        }
    })
}
