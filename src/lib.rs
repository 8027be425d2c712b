#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;
pub mod workers;

use crate::adapters::mail::{ConsoleMailTransport, HttpMailTransport, SmtpMailTransport};
use crate::adapters::memory::MemoryRateLimitStore;
use crate::adapters::redis::{RedisClient, ValkeyRateLimitStore};
use crate::api::ServiceContainer;
use crate::config::{Config, ContactConfig, MailConfig, RateLimitConfig, RateLimitStoreKind, TransportKind};
use crate::services::health_service::HealthService;
use crate::services::rate_limit_service::{RateLimitService, RateLimitStore};
use crate::services::submission_service::SubmissionService;
use crate::services::transport::MailTransport;
use crate::workers::RateLimitGcWorker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Background tasks owned by the application.
#[derive(Debug)]
pub struct Workers {
    rate_limit_gc: RateLimitGcWorker,
}

impl Workers {
    #[must_use]
    pub fn spawn_all(self, shutdown_rx: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![tokio::spawn(self.rate_limit_gc.run(shutdown_rx).instrument(tracing::info_span!("rate_limit_gc_worker")))]
    }
}

#[derive(Debug)]
pub struct App {
    pub services: ServiceContainer,
    pub health_service: HealthService,
    pub workers: Workers,
}

/// Wires transports, stores and services together.
///
/// A transport or store supplied through the builder takes precedence over the
/// one named in the configuration.
#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    transport: Option<Arc<dyn MailTransport>>,
    store: Option<Arc<dyn RateLimitStore>>,
}

impl AppBuilder {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config, transport: None, store: None }
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn RateLimitStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the application services.
    ///
    /// # Errors
    /// Returns an error if the configured sender or recipient is not a valid address,
    /// if the configured transport cannot be constructed or the
    /// rate-limit store is unreachable.
    pub async fn build(self) -> anyhow::Result<App> {
        check_contact_addresses(&self.config.contact)?;
        if self.config.server.request_timeout_secs <= self.config.mail.send_timeout_secs {
            tracing::warn!(
                request_timeout_secs = self.config.server.request_timeout_secs,
                send_timeout_secs = self.config.mail.send_timeout_secs,
                "Request timeout does not exceed the send timeout; slow sends will surface as 408"
            );
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => build_transport(&self.config.mail)?,
        };
        let store = match self.store {
            Some(store) => store,
            None => build_store(&self.config.rate_limit).await?,
        };

        let rate_limit_service = RateLimitService::new(
            self.config.server.trusted_proxies.clone(),
            Arc::clone(&store),
            self.config.rate_limit.window_secs,
        );

        let submission_service = SubmissionService::new(
            Arc::clone(&transport),
            rate_limit_service.clone(),
            self.config.contact.clone(),
            Duration::from_secs(self.config.mail.send_timeout_secs),
        );

        let health_service = HealthService::new(transport, Arc::clone(&store), self.config.health.clone());

        let workers = Workers {
            rate_limit_gc: RateLimitGcWorker::new(
                store,
                rate_limit_service.window(),
                self.config.rate_limit.gc_interval_secs,
            ),
        };

        Ok(App { services: ServiceContainer { submission_service, rate_limit_service }, health_service, workers })
    }
}

fn check_contact_addresses(config: &ContactConfig) -> anyhow::Result<()> {
    for (setting, value) in [("CONTACT_FROM_EMAIL", &config.from_email), ("CONTACT_TO_EMAIL", &config.to_email)] {
        value
            .parse::<lettre::Address>()
            .map_err(|e| anyhow::anyhow!("{setting} is not a valid address ({value}): {e}"))?;
    }
    Ok(())
}

fn build_transport(config: &MailConfig) -> anyhow::Result<Arc<dyn MailTransport>> {
    let transport: Arc<dyn MailTransport> = match config.transport {
        TransportKind::Smtp => Arc::new(SmtpMailTransport::new(&config.smtp)?),
        TransportKind::Http => Arc::new(HttpMailTransport::new(&config.http)?),
        TransportKind::Console => {
            tracing::warn!("Console transport selected: messages will be logged, not delivered");
            Arc::new(ConsoleMailTransport)
        }
    };
    tracing::info!(transport = ?config.transport, "Mail transport configured");
    Ok(transport)
}

async fn build_store(config: &RateLimitConfig) -> anyhow::Result<Arc<dyn RateLimitStore>> {
    match config.store {
        RateLimitStoreKind::Memory => Ok(Arc::new(MemoryRateLimitStore::new())),
        RateLimitStoreKind::Valkey => {
            let url = config
                .valkey_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("CONTACT_VALKEY_URL is required for the valkey rate-limit store"))?;
            let client = RedisClient::new(url).await?;
            Ok(Arc::new(ValkeyRateLimitStore::new(client)))
        }
    }
}

/// Routes panics through tracing before the default hook runs.
pub fn setup_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(panic = %info, "Unhandled panic");
        default_hook(info);
    }));
}

/// Flips the shutdown channel on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        tracing::info!("Shutdown signal received, draining connections...");
        let _ = shutdown_tx.send(true);
    });
}
