use crate::config::HealthConfig;
use crate::services::rate_limit_service::RateLimitStore;
use crate::services::transport::MailTransport;
use opentelemetry::{KeyValue, global, metrics::Gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Clone, Debug)]
pub struct Metrics {
    pub status: Gauge<i64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("contact-relay");
        Self {
            status: meter
                .i64_gauge("contact_health_status")
                .with_description("Status of health checks (1 for ok, 0 for error)")
                .build(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct HealthService {
    transport: Arc<dyn MailTransport>,
    store: Arc<dyn RateLimitStore>,
    config: HealthConfig,
    metrics: Metrics,
}

impl HealthService {
    #[must_use]
    pub fn new(transport: Arc<dyn MailTransport>, store: Arc<dyn RateLimitStore>, config: HealthConfig) -> Self {
        Self { transport, store, config, metrics: Metrics::new() }
    }

    /// Checks that the mail transport is reachable.
    ///
    /// # Errors
    /// Returns a string describing the failure if the transport is unreachable.
    pub async fn check_transport(&self) -> Result<(), String> {
        let transport_timeout = Duration::from_millis(self.config.transport_timeout_ms);

        match timeout(transport_timeout, self.transport.check()).await {
            Ok(Ok(())) => {
                self.metrics.status.record(1, &[KeyValue::new("component", "transport")]);
                Ok(())
            }
            Ok(Err(e)) => {
                self.metrics.status.record(0, &[KeyValue::new("component", "transport")]);
                Err(format!("Transport check failed: {e}"))
            }
            Err(_) => {
                self.metrics.status.record(0, &[KeyValue::new("component", "transport")]);
                Err("Transport check timed out".to_string())
            }
        }
    }

    /// Checks that the rate-limit store is reachable.
    ///
    /// # Errors
    /// Returns a string describing the failure if the store is unreachable.
    pub async fn check_store(&self) -> Result<(), String> {
        let store_timeout = Duration::from_millis(self.config.store_timeout_ms);

        match timeout(store_timeout, self.store.ping()).await {
            Ok(Ok(())) => {
                self.metrics.status.record(1, &[KeyValue::new("component", "rate_limit_store")]);
                Ok(())
            }
            Ok(Err(e)) => {
                self.metrics.status.record(0, &[KeyValue::new("component", "rate_limit_store")]);
                Err(format!("Rate limit store check failed: {e:?}"))
            }
            Err(_) => {
                self.metrics.status.record(0, &[KeyValue::new("component", "rate_limit_store")]);
                Err("Rate limit store check timed out".to_string())
            }
        }
    }
}
