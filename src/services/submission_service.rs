use crate::config::ContactConfig;
use crate::domain::email::render_email;
use crate::domain::rate_limit::whole_seconds;
use crate::domain::{ClientIdentity, Envelope, SentMessage, Submission, ValidationRules};
use crate::error::{AppError, Result};
use crate::services::rate_limit_service::{RateLimitService, Reservation};
use crate::services::transport::{MailTransport, TransportError};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;

/// Terminal result of one submission: the transport's message id or the reason it stopped.
pub type DispatchOutcome = Result<SentMessage>;

#[derive(Clone, Debug)]
struct Metrics {
    submissions_total: Counter<u64>,
    send_duration: Histogram<f64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("contact-relay");
        Self {
            submissions_total: meter
                .u64_counter("contact_submissions_total")
                .with_description("Contact submissions by terminal outcome")
                .build(),
            send_duration: meter
                .f64_histogram("contact_send_duration_seconds")
                .with_description("Time spent waiting on the mail transport")
                .build(),
        }
    }

    fn record(&self, outcome: &'static str) {
        self.submissions_total.add(1, &[KeyValue::new("outcome", outcome)]);
    }
}

/// Holds a granted send slot until the send settles.
///
/// Dropped while still armed (request cancelled or timed out upstream), it releases
/// the slot on the runtime so the client is not locked out by a send that never finished.
#[derive(Debug)]
struct ReservationGuard {
    rate_limiter: RateLimitService,
    identity: ClientIdentity,
    reserved_at: OffsetDateTime,
    armed: bool,
}

impl ReservationGuard {
    fn new(rate_limiter: RateLimitService, identity: ClientIdentity, reserved_at: OffsetDateTime) -> Self {
        Self { rate_limiter, identity, reserved_at, armed: true }
    }

    fn keep(mut self) {
        self.armed = false;
    }

    async fn release(mut self) {
        self.rate_limiter.release(&self.identity, self.reserved_at).await;
        self.armed = false;
    }
}

impl Drop for ReservationGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(identity = %self.identity, "No runtime left to release abandoned reservation");
            return;
        };

        tracing::warn!(identity = %self.identity, "Dispatch abandoned mid-send, releasing reservation");
        let rate_limiter = self.rate_limiter.clone();
        let identity = self.identity.clone();
        let reserved_at = self.reserved_at;
        handle.spawn(async move {
            rate_limiter.release(&identity, reserved_at).await;
        });
    }
}

#[derive(Clone, Debug)]
pub struct SubmissionService {
    transport: Arc<dyn MailTransport>,
    rate_limiter: RateLimitService,
    config: ContactConfig,
    rules: ValidationRules,
    send_timeout: Duration,
    metrics: Metrics,
}

impl SubmissionService {
    #[must_use]
    pub fn new(
        transport: Arc<dyn MailTransport>,
        rate_limiter: RateLimitService,
        config: ContactConfig,
        send_timeout: Duration,
    ) -> Self {
        let rules = ValidationRules { max_message_chars: config.max_message_length };
        Self { transport, rate_limiter, config, rules, send_timeout, metrics: Metrics::new() }
    }

    #[must_use]
    pub fn transport(&self) -> Arc<dyn MailTransport> {
        Arc::clone(&self.transport)
    }

    #[must_use]
    pub fn validate(&self, submission: &Submission) -> Vec<String> {
        submission.validate(&self.rules)
    }

    /// Builds the outgoing envelope, applying request overrides where permitted.
    #[must_use]
    pub fn envelope(&self, submission: &Submission, received_at: OffsetDateTime) -> Envelope {
        let overrides = submission.overrides();
        let rendered = render_email(submission, received_at);

        let (to, from_email, html) = if self.config.allow_overrides {
            (
                overrides.to.clone().unwrap_or_else(|| self.config.to_email.clone()),
                overrides.from.clone().unwrap_or_else(|| self.config.from_email.clone()),
                overrides.html.clone().unwrap_or(rendered.html),
            )
        } else {
            if overrides.to.is_some() || overrides.from.is_some() || overrides.html.is_some() {
                tracing::debug!("Ignoring to/from/html overrides, overrides are disabled");
            }
            (self.config.to_email.clone(), self.config.from_email.clone(), rendered.html)
        };

        Envelope {
            from_name: self.config.from_name.clone(),
            from_email,
            to,
            reply_to: overrides.reply_to.clone().unwrap_or_else(|| submission.email().to_string()),
            subject: overrides.subject.clone().unwrap_or_else(|| self.config.subject.clone()),
            html,
            text: rendered.text,
        }
    }

    /// Validates, rate-checks, renders and sends one submission.
    ///
    /// # Errors
    /// Returns `AppError::Validation` with every violated rule.
    /// Returns `AppError::RateLimited` if the identity sent within the window.
    /// Returns `AppError::Transport` if the transport failed or timed out.
    /// Returns `AppError::Store` if the rate-limit store is unavailable.
    pub async fn dispatch(&self, identity: &ClientIdentity, submission: &Submission) -> DispatchOutcome {
        self.dispatch_at(identity, submission, OffsetDateTime::now_utc()).await
    }

    /// Same as [`Self::dispatch`] with an explicit clock reading.
    ///
    /// # Errors
    /// See [`Self::dispatch`].
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, identity, submission, now),
        fields(identity = %identity, message_id = tracing::field::Empty)
    )]
    pub async fn dispatch_at(
        &self,
        identity: &ClientIdentity,
        submission: &Submission,
        now: OffsetDateTime,
    ) -> DispatchOutcome {
        let errors = self.validate(submission);
        if !errors.is_empty() {
            self.metrics.record("rejected");
            return Err(AppError::Validation(errors));
        }

        let reserved_at = match self.rate_limiter.reserve(identity, now).await.map_err(AppError::Store)? {
            Reservation::Granted { reserved_at } => reserved_at,
            Reservation::Denied { retry_after } => {
                self.metrics.record("throttled");
                return Err(AppError::RateLimited { retry_after_secs: whole_seconds(retry_after) });
            }
        };

        let guard = ReservationGuard::new(self.rate_limiter.clone(), identity.clone(), reserved_at);
        let envelope = self.envelope(submission, now);

        let started = Instant::now();
        let sent = match tokio::time::timeout(self.send_timeout, self.transport.send(&envelope)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };
        self.metrics.send_duration.record(started.elapsed().as_secs_f64(), &[]);

        match sent {
            Ok(message_id) => {
                guard.keep();
                tracing::Span::current().record("message_id", message_id.as_str());
                tracing::info!(reply_to = %envelope.reply_to, "Contact message sent");
                self.metrics.record("sent");
                Ok(SentMessage { message_id })
            }
            Err(e) => {
                // A failed send must not lock the sender out of retrying.
                guard.release().await;
                self.metrics.record("transport_failed");
                Err(AppError::Transport(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryRateLimitStore;
    use crate::domain::Overrides;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use time::macros::datetime;

    #[derive(Debug, Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Envelope>>,
    }

    #[async_trait]
    impl MailTransport for RecordingTransport {
        async fn send(&self, envelope: &Envelope) -> std::result::Result<String, TransportError> {
            let mut sent = self.sent.lock().unwrap();
            sent.push(envelope.clone());
            Ok(format!("<{}@test>", sent.len()))
        }
    }

    #[derive(Debug)]
    struct FailingTransport;

    #[async_trait]
    impl MailTransport for FailingTransport {
        async fn send(&self, _envelope: &Envelope) -> std::result::Result<String, TransportError> {
            Err(TransportError::Smtp("connection refused".into()))
        }
    }

    #[derive(Debug)]
    struct StalledTransport;

    #[async_trait]
    impl MailTransport for StalledTransport {
        async fn send(&self, _envelope: &Envelope) -> std::result::Result<String, TransportError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("never".into())
        }
    }

    fn service_with(transport: Arc<dyn MailTransport>, config: ContactConfig) -> SubmissionService {
        let limiter = RateLimitService::new(vec![], Arc::new(MemoryRateLimitStore::new()), 60);
        SubmissionService::new(transport, limiter, config, Duration::from_millis(200))
    }

    fn valid() -> Submission {
        Submission::new(Some("Al".into()), Some("al@x.com".into()), Some("Hello there, nice site!".into()))
    }

    const NOW: OffsetDateTime = datetime!(2024-05-01 12:00:00 UTC);

    #[tokio::test]
    async fn test_dispatch_then_immediate_resubmit_is_throttled() {
        let transport = Arc::new(RecordingTransport::default());
        let service = service_with(transport.clone(), ContactConfig::default());
        let identity = ClientIdentity::new("ip:1.1.1.1");

        let sent = service.dispatch_at(&identity, &valid(), NOW).await.unwrap();
        assert!(!sent.message_id.is_empty());

        let second = service.dispatch_at(&identity, &valid(), NOW + time::Duration::seconds(1)).await;
        assert!(matches!(second, Err(AppError::RateLimited { retry_after_secs: 59 })));
        assert_eq!(transport.sent.lock().unwrap().len(), 1);

        let later = service.dispatch_at(&identity, &valid(), NOW + time::Duration::seconds(61)).await;
        assert!(later.is_ok());
    }

    #[tokio::test]
    async fn test_validation_failure_does_not_consume_window() {
        let transport = Arc::new(RecordingTransport::default());
        let service = service_with(transport.clone(), ContactConfig::default());
        let identity = ClientIdentity::new("ip:1.1.1.1");
        let bad = Submission::new(Some("A".into()), Some("a@b".into()), Some("short".into()));

        let Err(AppError::Validation(errors)) = service.dispatch_at(&identity, &bad, NOW).await else {
            panic!("expected validation failure");
        };
        assert_eq!(errors.len(), 3);

        assert!(service.dispatch_at(&identity, &valid(), NOW).await.is_ok());
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_releases_window() {
        let limiter = RateLimitService::new(vec![], Arc::new(MemoryRateLimitStore::new()), 60);
        let failing =
            SubmissionService::new(Arc::new(FailingTransport), limiter.clone(), ContactConfig::default(), Duration::from_secs(1));
        let identity = ClientIdentity::new("ip:2.2.2.2");

        let result = failing.dispatch_at(&identity, &valid(), NOW).await;
        assert!(matches!(result, Err(AppError::Transport(TransportError::Smtp(_)))));

        let recording = SubmissionService::new(
            Arc::new(RecordingTransport::default()),
            limiter,
            ContactConfig::default(),
            Duration::from_secs(1),
        );
        assert!(recording.dispatch_at(&identity, &valid(), NOW).await.is_ok());
    }

    #[tokio::test]
    async fn test_stalled_transport_times_out() {
        let service = service_with(Arc::new(StalledTransport), ContactConfig::default());
        let result = service.dispatch_at(&ClientIdentity::new("ip:3.3.3.3"), &valid(), NOW).await;
        assert!(matches!(result, Err(AppError::Transport(TransportError::Timeout))));
    }

    #[tokio::test]
    async fn test_abandoned_dispatch_releases_window() {
        let limiter = RateLimitService::new(vec![], Arc::new(MemoryRateLimitStore::new()), 60);
        let stalled = SubmissionService::new(
            Arc::new(StalledTransport),
            limiter.clone(),
            ContactConfig::default(),
            Duration::from_secs(60),
        );
        let identity = ClientIdentity::new("ip:5.5.5.5");

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), stalled.dispatch_at(&identity, &valid(), NOW)).await;
        assert!(abandoned.is_err());

        // Let the spawned release run.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(limiter.reserve(&identity, NOW).await.unwrap(), Reservation::Granted { .. }));
    }

    #[tokio::test]
    async fn test_envelope_defaults() {
        let transport = Arc::new(RecordingTransport::default());
        let config = ContactConfig {
            to_email: "owner@example.com".into(),
            from_email: "noreply@example.com".into(),
            ..ContactConfig::default()
        };
        let service = service_with(transport.clone(), config);

        service.dispatch_at(&ClientIdentity::new("ip:4.4.4.4"), &valid(), NOW).await.unwrap();

        let sent = transport.sent.lock().unwrap();
        let envelope = &sent[0];
        assert_eq!(envelope.to, "owner@example.com");
        assert_eq!(envelope.from_name, "Portfolio Contact");
        assert_eq!(envelope.from_email, "noreply@example.com");
        assert_eq!(envelope.reply_to, "al@x.com");
        assert_eq!(envelope.subject, "New message from your portfolio website");
        assert_eq!(envelope.text, "Name: Al\nEmail: al@x.com\nMessage: Hello there, nice site!");
    }

    #[test]
    fn test_relay_overrides_ignored_unless_allowed() {
        let overrides = Overrides {
            to: Some("victim@example.org".into()),
            from: Some("spoof@example.org".into()),
            subject: Some("Custom subject".into()),
            reply_to: Some("other@x.com".into()),
            html: Some("<p>raw</p>".into()),
        };
        let submission = valid().with_overrides(overrides);

        let locked = service_with(Arc::new(RecordingTransport::default()), ContactConfig::default());
        let envelope = locked.envelope(&submission, NOW);
        assert_eq!(envelope.to, ContactConfig::default().to_email);
        assert_eq!(envelope.from_email, ContactConfig::default().from_email);
        assert_ne!(envelope.html, "<p>raw</p>");
        assert_eq!(envelope.subject, "Custom subject");
        assert_eq!(envelope.reply_to, "other@x.com");

        let open = service_with(
            Arc::new(RecordingTransport::default()),
            ContactConfig { allow_overrides: true, ..ContactConfig::default() },
        );
        let envelope = open.envelope(&submission, NOW);
        assert_eq!(envelope.to, "victim@example.org");
        assert_eq!(envelope.from_email, "spoof@example.org");
        assert_eq!(envelope.html, "<p>raw</p>");
    }
}
