use crate::adapters::mail::{generate_message_id, sender_mailbox};
use crate::config::{SmtpConfig, SmtpTls};
use crate::domain::Envelope;
use crate::services::transport::{MailTransport, TransportError};
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// Delivers mail through an SMTP relay.
#[derive(Debug)]
pub struct SmtpMailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
}

impl SmtpMailTransport {
    /// Creates a transport for the configured relay. No connection is made until the first send.
    ///
    /// # Errors
    /// Returns an error if the relay host cannot be used for TLS.
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        let builder = match config.tls {
            SmtpTls::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?,
            SmtpTls::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?,
            SmtpTls::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
        };

        let builder = builder.port(config.port);
        let builder = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
            _ => builder,
        };

        tracing::info!(host = %config.host, port = config.port, tls = ?config.tls, "SMTP transport configured");

        Ok(Self { transport: builder.build(), host: config.host.clone() })
    }
}

fn parse_mailbox(value: &str) -> Result<Mailbox, TransportError> {
    value.parse().map_err(|e| TransportError::InvalidAddress(format!("{value}: {e}")))
}

/// Converts an envelope into a multipart/alternative message with the given id.
///
/// A reply-to address lettre cannot parse is dropped rather than failing the send.
pub(crate) fn build_message(envelope: &Envelope, message_id: &str) -> Result<Message, TransportError> {
    let mut builder = Message::builder().from(sender_mailbox(envelope)?).to(parse_mailbox(&envelope.to)?);

    match envelope.reply_to.parse::<Mailbox>() {
        Ok(reply_to) => builder = builder.reply_to(reply_to),
        Err(e) => {
            tracing::warn!(reply_to = %envelope.reply_to, error = %e, "Sending without unparseable Reply-To");
        }
    }

    builder
        .subject(envelope.subject.as_str())
        .message_id(Some(message_id.to_string()))
        .user_agent("contact-relay".to_string())
        .multipart(MultiPart::alternative_plain_html(envelope.text.clone(), envelope.html.clone()))
        .map_err(|e| TransportError::Build(e.to_string()))
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, envelope: &Envelope) -> Result<String, TransportError> {
        let message_id = generate_message_id(&envelope.from_email);
        let message = build_message(envelope, &message_id)?;

        let response = self.transport.send(message).await.map_err(|e| TransportError::Smtp(e.to_string()))?;
        tracing::debug!(host = %self.host, code = %response.code(), "SMTP relay accepted message");

        Ok(message_id)
    }

    async fn check(&self) -> Result<(), TransportError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(TransportError::Smtp(format!("{} did not answer NOOP", self.host))),
            Err(e) => Err(TransportError::Smtp(e.to_string())),
        }
    }
}
