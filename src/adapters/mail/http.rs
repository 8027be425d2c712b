use crate::adapters::mail::sender_mailbox;
use crate::config::HttpMailConfig;
use crate::domain::Envelope;
use crate::services::transport::{MailTransport, TransportError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct SendEmailBody<'a> {
    from: String,
    to: [&'a str; 1],
    reply_to: &'a str,
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: String,
}

/// Delivers mail through a Resend-compatible HTTP API (`POST {base}/emails`).
#[derive(Debug, Clone)]
pub struct HttpMailTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpMailTransport {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &HttpMailConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().user_agent(concat!("contact-relay/", env!("CARGO_PKG_VERSION"))).build()?;
        let endpoint = format!("{}/emails", config.base_url.trim_end_matches('/'));
        Ok(Self { client, endpoint, api_key: config.api_key.clone() })
    }
}

#[async_trait]
impl MailTransport for HttpMailTransport {
    async fn send(&self, envelope: &Envelope) -> Result<String, TransportError> {
        let body = SendEmailBody {
            from: sender_mailbox(envelope)?.to_string(),
            to: [&envelope.to],
            reply_to: &envelope.reply_to,
            subject: &envelope.subject,
            html: &envelope.html,
            text: &envelope.text,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| TransportError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, detail = %detail, "Mail API rejected message");
            return Err(TransportError::Rejected { status: status.as_u16() });
        }

        let parsed: SendEmailResponse = response.json().await.map_err(|e| TransportError::Http(e.to_string()))?;
        if parsed.id.is_empty() {
            return Err(TransportError::Http("Mail API returned an empty message id".to_string()));
        }
        Ok(parsed.id)
    }
}
