use crate::services::rate_limit_service::RateLimitStore;
use opentelemetry::{global, metrics::Counter};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::Instrument;

#[derive(Clone, Debug)]
struct Metrics {
    pruned_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("contact-relay");
        Self {
            pruned_total: meter
                .u64_counter("rate_limit_entries_pruned_total")
                .with_description("Expired send-window entries removed from the store")
                .build(),
        }
    }
}

#[derive(Debug)]
pub struct RateLimitGcWorker {
    store: Arc<dyn RateLimitStore>,
    window: time::Duration,
    interval: Duration,
    metrics: Metrics,
}

impl RateLimitGcWorker {
    #[must_use]
    pub fn new(store: Arc<dyn RateLimitStore>, window: time::Duration, interval_secs: u64) -> Self {
        Self { store, window, interval: Duration::from_secs(interval_secs.max(1)), metrics: Metrics::new() }
    }

    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.perform_gc()
                        .instrument(tracing::debug_span!("rate_limit_gc_iteration"))
                        .await
                    {
                        tracing::error!(error = ?e, "Rate limit GC iteration failed");
                    }
                }
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("Rate limit GC loop shutting down...");
    }

    /// Removes expired entries from the store.
    ///
    /// # Errors
    /// Returns an error if the store is unavailable.
    pub async fn perform_gc(&self) -> anyhow::Result<usize> {
        let removed = self.store.prune(OffsetDateTime::now_utc(), self.window).await?;
        if removed > 0 {
            tracing::debug!(count = removed, "Pruned expired send-window entries");
            self.metrics.pruned_total.add(u64::try_from(removed).unwrap_or(u64::MAX), &[]);
        }
        Ok(removed)
    }
}
