use crate::adapters::mail::generate_message_id;
use crate::domain::Envelope;
use crate::services::transport::{MailTransport, TransportError};
use async_trait::async_trait;

/// Development transport: logs the envelope instead of delivering it.
#[derive(Debug, Default)]
pub struct ConsoleMailTransport;

#[async_trait]
impl MailTransport for ConsoleMailTransport {
    async fn send(&self, envelope: &Envelope) -> Result<String, TransportError> {
        let message_id = generate_message_id(&envelope.from_email);
        tracing::info!(
            message_id = %message_id,
            from_name = %envelope.from_name,
            from_email = %envelope.from_email,
            to = %envelope.to,
            reply_to = %envelope.reply_to,
            subject = %envelope.subject,
            body = %envelope.text,
            "Console transport: message not delivered"
        );
        Ok(message_id)
    }
}
