#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    missing_debug_implementations,
    clippy::clone_on_ref_ptr,
    unreachable_pub,
    dead_code
)]
use async_trait::async_trait;
use contact_relay::AppBuilder;
use contact_relay::adapters::memory::MemoryRateLimitStore;
use contact_relay::api::MgmtState;
use contact_relay::config::Config;
use contact_relay::domain::Envelope;
use contact_relay::services::transport::{MailTransport, TransportError};
use reqwest::Client;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use std::sync::{Arc, Mutex, Once};
use tokio::net::TcpListener;
use tokio::sync::watch;

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("contact_relay=debug".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

/// In-process transport that keeps every delivered envelope and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Envelope>>,
    failing: AtomicBool,
    delay_ms: AtomicU64,
}

impl RecordingTransport {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(u64::try_from(delay.as_millis()).unwrap(), Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, envelope: &Envelope) -> Result<String, TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Smtp("connection refused".to_string()));
        }
        let delay_ms = self.delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(envelope.clone());
        Ok(format!("<test-{}@example.com>", sent.len()))
    }

    async fn check(&self) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Smtp("connection refused".to_string()));
        }
        Ok(())
    }
}

pub fn get_test_config() -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.server.mgmt_port = 0;
    config.server.trusted_proxies = vec!["127.0.0.1/32".parse().unwrap(), "::1/128".parse().unwrap()];
    config.rate_limit.per_second = 10000;
    config.rate_limit.burst = 10000;
    config.contact.to_email = "owner@example.com".to_string();
    config.contact.from_email = "noreply@example.com".to_string();
    config
}

pub fn valid_payload() -> Value {
    json!({
        "name": "Jane Doe",
        "email": "jane@example.com",
        "message": "Hello there, I would like to talk about a project."
    })
}

pub struct TestApp {
    pub server_url: String,
    pub mgmt_url: String,
    pub client: Client,
    pub config: Config,
    pub transport: Arc<RecordingTransport>,
    pub shutdown_tx: watch::Sender<bool>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_config(get_test_config()).await
    }

    pub async fn spawn_with_config(config: Config) -> Self {
        setup_tracing();

        let transport = Arc::new(RecordingTransport::default());
        let app = AppBuilder::new(config.clone())
            .with_transport(transport.clone())
            .with_store(Arc::new(MemoryRateLimitStore::new()))
            .build()
            .await
            .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let router = contact_relay::api::app_router(&config, app.services).unwrap();
        let mgmt = contact_relay::api::mgmt_router(MgmtState { health_service: app.health_service });

        let api_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mgmt_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server_url = format!("http://{}", api_listener.local_addr().unwrap());
        let mgmt_url = format!("http://{}", mgmt_listener.local_addr().unwrap());

        let mut api_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(api_listener, router.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move {
                    let _ = api_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        let mut mgmt_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            axum::serve(mgmt_listener, mgmt.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(async move {
                    let _ = mgmt_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        let _workers = app.workers.spawn_all(shutdown_rx);

        Self { server_url, mgmt_url, client: Client::new(), config, transport, shutdown_tx }
    }

    pub fn contact_url(&self) -> String {
        format!("{}/v1/contact", self.server_url)
    }

    pub async fn submit_from(&self, ip: &str, payload: &Value) -> reqwest::Response {
        self.client.post(self.contact_url()).header("X-Forwarded-For", ip).json(payload).send().await.unwrap()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}
