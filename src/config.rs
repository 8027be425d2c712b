use clap::{Args, Parser, ValueEnum};
use ipnetwork::IpNetwork;

#[derive(Clone, Debug, Default, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub rate_limit: RateLimitConfig,

    #[command(flatten)]
    pub mail: MailConfig,

    #[command(flatten)]
    pub contact: ContactConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,

    #[command(flatten)]
    pub health: HealthConfig,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long = "host", env = "CONTACT_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the public API
    #[arg(long = "port", env = "CONTACT_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Port for the management server (health probes)
    #[arg(long = "mgmt-port", env = "CONTACT_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Comma-separated list of CIDRs to trust for X-Forwarded-For IP extraction
    #[arg(
        long = "trusted-proxies",
        env = "CONTACT_TRUSTED_PROXIES",
        default_value = "10.0.0.0/8,172.16.0.0/12,192.168.0.0/16,127.0.0.1/32",
        value_delimiter = ','
    )]
    pub trusted_proxies: Vec<IpNetwork>,

    /// Comma-separated list of origins allowed by CORS ("*" allows any origin)
    #[arg(long = "cors-origins", env = "CONTACT_CORS_ORIGINS", default_value = "*", value_delimiter = ',')]
    pub cors_allowed_origins: Vec<String>,

    /// Maximum time to serve a single request
    #[arg(long = "request-timeout-secs", env = "CONTACT_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// How long to wait for background tasks on shutdown
    #[arg(long = "shutdown-timeout-secs", env = "CONTACT_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            mgmt_port: 9090,
            trusted_proxies: ["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16", "127.0.0.1/32"]
                .iter()
                .filter_map(|cidr| cidr.parse().ok())
                .collect(),
            cors_allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
            shutdown_timeout_secs: 5,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum RateLimitStoreKind {
    #[default]
    Memory,
    Valkey,
}

#[derive(Clone, Debug, Args)]
pub struct RateLimitConfig {
    /// Minimum number of seconds between two sends from the same client
    #[arg(long = "send-window-secs", env = "CONTACT_SEND_WINDOW_SECS", default_value_t = 60)]
    pub window_secs: u64,

    /// Where last-send timestamps are kept
    #[arg(long = "rate-limit-store", env = "CONTACT_RATE_LIMIT_STORE", value_enum, default_value_t = RateLimitStoreKind::Memory)]
    pub store: RateLimitStoreKind,

    /// Valkey/Redis URL, required when the store is `valkey`
    #[arg(long = "valkey-url", env = "CONTACT_VALKEY_URL")]
    pub valkey_url: Option<String>,

    /// How often expired in-memory entries are pruned
    #[arg(long = "rate-limit-gc-interval-secs", env = "CONTACT_RATE_LIMIT_GC_INTERVAL_SECS", default_value_t = 300)]
    pub gc_interval_secs: u64,

    /// Requests per second allowed per IP before the request governor rejects them
    #[arg(long = "requests-per-second", env = "CONTACT_REQUESTS_PER_SECOND", default_value_t = 2)]
    pub per_second: u32,

    /// Burst allowance for the request governor
    #[arg(long = "requests-burst", env = "CONTACT_REQUESTS_BURST", default_value_t = 5)]
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            store: RateLimitStoreKind::Memory,
            valkey_url: None,
            gc_interval_secs: 300,
            per_second: 2,
            burst: 5,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    Smtp,
    Http,
    #[default]
    Console,
}

#[derive(Clone, Debug, Args)]
pub struct MailConfig {
    /// Which outbound mail transport to use
    #[arg(long = "transport", env = "CONTACT_TRANSPORT", value_enum, default_value_t = TransportKind::Console)]
    pub transport: TransportKind,

    /// Upper bound on a single transport send
    #[arg(long = "send-timeout-secs", env = "CONTACT_SEND_TIMEOUT_SECS", default_value_t = 10)]
    pub send_timeout_secs: u64,

    #[command(flatten)]
    pub smtp: SmtpConfig,

    #[command(flatten)]
    pub http: HttpMailConfig,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Console,
            send_timeout_secs: 10,
            smtp: SmtpConfig::default(),
            http: HttpMailConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum SmtpTls {
    /// Upgrade a plain connection with STARTTLS (usually port 587)
    #[default]
    Starttls,
    /// Implicit TLS (usually port 465)
    Tls,
    /// No encryption, only for local relays
    None,
}

#[derive(Clone, Debug, Args)]
pub struct SmtpConfig {
    /// SMTP server host
    #[arg(id = "smtp_host", long = "smtp-host", env = "CONTACT_SMTP_HOST", default_value = "localhost")]
    pub host: String,

    /// SMTP server port
    #[arg(id = "smtp_port", long = "smtp-port", env = "CONTACT_SMTP_PORT", default_value_t = 587)]
    pub port: u16,

    /// SMTP username
    #[arg(long = "smtp-username", env = "CONTACT_SMTP_USERNAME")]
    pub username: Option<String>,

    /// SMTP password (or app password)
    #[arg(long = "smtp-password", env = "CONTACT_SMTP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Connection security
    #[arg(long = "smtp-tls", env = "CONTACT_SMTP_TLS", value_enum, default_value_t = SmtpTls::Starttls)]
    pub tls: SmtpTls,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self { host: "localhost".to_string(), port: 587, username: None, password: None, tls: SmtpTls::Starttls }
    }
}

#[derive(Clone, Debug, Args)]
pub struct HttpMailConfig {
    /// Base URL of the HTTP mail API (Resend-compatible `POST /emails`)
    #[arg(long = "mail-api-url", env = "CONTACT_MAIL_API_URL", default_value = "https://api.resend.com")]
    pub base_url: String,

    /// API key sent as a bearer token
    #[arg(long = "mail-api-key", env = "CONTACT_MAIL_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

impl Default for HttpMailConfig {
    fn default() -> Self {
        Self { base_url: "https://api.resend.com".to_string(), api_key: None }
    }
}

#[derive(Clone, Debug, Args)]
pub struct ContactConfig {
    /// Address that receives contact-form messages
    #[arg(long = "to-email", env = "CONTACT_TO_EMAIL", default_value = "owner@localhost")]
    pub to_email: String,

    /// Sender address used on outbound mail
    #[arg(long = "from-email", env = "CONTACT_FROM_EMAIL", default_value = "noreply@localhost")]
    pub from_email: String,

    /// Display name used on outbound mail
    #[arg(long = "from-name", env = "CONTACT_FROM_NAME", default_value = "Portfolio Contact")]
    pub from_name: String,

    /// Subject used when the submission does not override it
    #[arg(
        long = "subject",
        env = "CONTACT_SUBJECT",
        default_value = "New message from your portfolio website"
    )]
    pub subject: String,

    /// Honor `to`, `from` and `html` overrides from the request body
    #[arg(long = "allow-overrides", env = "CONTACT_ALLOW_OVERRIDES", default_value_t = false)]
    pub allow_overrides: bool,

    /// Maximum message length in characters
    #[arg(long = "max-message-length", env = "CONTACT_MAX_MESSAGE_LENGTH", default_value_t = 1000)]
    pub max_message_length: usize,
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            to_email: "owner@localhost".to_string(),
            from_email: "noreply@localhost".to_string(),
            from_name: "Portfolio Contact".to_string(),
            subject: "New message from your portfolio website".to_string(),
            allow_overrides: false,
            max_message_length: 1000,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Default, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long = "log-format", env = "CONTACT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint; traces and metrics are exported only when set
    #[arg(long = "otlp-endpoint", env = "CONTACT_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

#[derive(Clone, Debug, Args)]
pub struct HealthConfig {
    /// Timeout for the transport readiness check
    #[arg(long = "health-transport-timeout-ms", env = "CONTACT_HEALTH_TRANSPORT_TIMEOUT_MS", default_value_t = 2000)]
    pub transport_timeout_ms: u64,

    /// Timeout for the rate-limit store readiness check
    #[arg(long = "health-store-timeout-ms", env = "CONTACT_HEALTH_STORE_TIMEOUT_MS", default_value_t = 500)]
    pub store_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { transport_timeout_ms: 2000, store_timeout_ms: 500 }
    }
}
