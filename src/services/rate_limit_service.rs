use crate::domain::ClientIdentity;
use crate::domain::rate_limit::whole_seconds;
use async_trait::async_trait;
use axum::http::Request;
use axum::http::StatusCode;
use ipnetwork::IpNetwork;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::net::IpAddr;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tower_governor::GovernorError;
use tower_governor::key_extractor::KeyExtractor;
use tracing::warn;

/// Outcome of an atomic check-and-set against the send window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The slot was taken; the timestamp written is kept so the slot can be released.
    Granted { reserved_at: OffsetDateTime },
    /// The identity sent too recently.
    Denied { retry_after: Duration },
}

/// Storage for per-identity last-send timestamps.
///
/// `reserve` must be atomic per identity: two concurrent reservations inside
/// one window never both succeed.
#[async_trait]
pub trait RateLimitStore: Send + Sync + std::fmt::Debug {
    /// Records `now` as the last send for `identity` unless it sent within `window`.
    ///
    /// # Errors
    /// Returns an error if the backing store is unavailable.
    async fn reserve(
        &self,
        identity: &ClientIdentity,
        now: OffsetDateTime,
        window: Duration,
    ) -> anyhow::Result<Reservation>;

    /// Drops a reservation made at `reserved_at`, if it is still the latest one.
    ///
    /// # Errors
    /// Returns an error if the backing store is unavailable.
    async fn release(&self, identity: &ClientIdentity, reserved_at: OffsetDateTime) -> anyhow::Result<()>;

    /// Removes entries whose window has passed. Returns how many were removed.
    ///
    /// # Errors
    /// Returns an error if the backing store is unavailable.
    async fn prune(&self, _now: OffsetDateTime, _window: Duration) -> anyhow::Result<usize> {
        Ok(0)
    }

    /// Checks that the store is reachable.
    ///
    /// # Errors
    /// Returns an error if the backing store is unavailable.
    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct Metrics {
    pub decisions_total: Counter<u64>,
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        let meter = global::meter("contact-relay");
        Self {
            decisions_total: meter
                .u64_counter("rate_limit_decisions_total")
                .with_description("Rate limit decisions (allowed/throttled)")
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
pub struct IpKeyExtractor {
    trusted_proxies: Vec<IpNetwork>,
}

impl IpKeyExtractor {
    #[must_use]
    pub const fn new(trusted_proxies: Vec<IpNetwork>) -> Self {
        Self { trusted_proxies }
    }

    /// Resolves the originating client address.
    ///
    /// `X-Forwarded-For` is only honored when the peer is a trusted proxy; the chain
    /// is walked right to left and the first untrusted hop is the client.
    #[must_use]
    pub fn identify_client_ip(&self, headers: &axum::http::HeaderMap, peer_addr: IpAddr) -> IpAddr {
        if !self.is_trusted(&peer_addr) {
            return peer_addr;
        }

        let xff = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok());

        if let Some(xff_val) = xff
            && let Some(real_ip) =
                xff_val.rsplit(',').filter_map(|s| s.trim().parse::<IpAddr>().ok()).find(|ip| !self.is_trusted(ip))
        {
            return real_ip;
        }

        peer_addr
    }

    fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.trusted_proxies.iter().any(|net| net.contains(*ip))
    }
}

impl KeyExtractor for IpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        use axum::extract::ConnectInfo;
        use std::net::SocketAddr;

        let peer_ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .ok_or(GovernorError::UnableToExtractKey)?;

        Ok(self.identify_client_ip(req.headers(), peer_ip))
    }
}

/// Enforces the minimum interval between sends for one client.
#[derive(Clone, Debug)]
pub struct RateLimitService {
    pub extractor: IpKeyExtractor,
    store: Arc<dyn RateLimitStore>,
    window: Duration,
    metrics: Metrics,
}

impl RateLimitService {
    #[must_use]
    pub fn new(trusted_proxies: Vec<IpNetwork>, store: Arc<dyn RateLimitStore>, window_secs: u64) -> Self {
        Self {
            extractor: IpKeyExtractor::new(trusted_proxies),
            store,
            window: Duration::seconds(i64::try_from(window_secs).unwrap_or(i64::MAX)),
            metrics: Metrics::new(),
        }
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn RateLimitStore> {
        Arc::clone(&self.store)
    }

    /// Tries to claim the send slot for `identity` at `now`.
    ///
    /// # Errors
    /// Returns an error if the store is unavailable.
    pub async fn reserve(&self, identity: &ClientIdentity, now: OffsetDateTime) -> anyhow::Result<Reservation> {
        let reservation = self.store.reserve(identity, now, self.window).await?;
        let label = match reservation {
            Reservation::Granted { .. } => "allowed",
            Reservation::Denied { retry_after } => {
                warn!(identity = %identity, retry_after_secs = whole_seconds(retry_after), "Send window not elapsed");
                "throttled"
            }
        };
        self.metrics.decisions_total.add(1, &[KeyValue::new("status", label), KeyValue::new("tier", "send")]);
        Ok(reservation)
    }

    /// Gives back a slot whose send did not go through.
    pub async fn release(&self, identity: &ClientIdentity, reserved_at: OffsetDateTime) {
        if let Err(e) = self.store.release(identity, reserved_at).await {
            tracing::error!(error = %e, identity = %identity, "Failed to release send reservation");
        }
    }

    /// Records a decision taken by the request governor in front of the API.
    pub fn log_decision(&self, status: StatusCode, ratelimit_after: Option<String>) {
        let label = if status == StatusCode::TOO_MANY_REQUESTS {
            if let Some(after) = ratelimit_after {
                warn!("Request rate limit exceeded (retry allowed after {}s)", after);
            }
            "throttled"
        } else {
            "allowed"
        };

        self.metrics.decisions_total.add(1, &[KeyValue::new("status", label), KeyValue::new("tier", "request")]);
    }
}
