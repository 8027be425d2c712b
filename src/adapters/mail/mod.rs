pub mod console;
pub mod http;
pub mod smtp;

pub use console::ConsoleMailTransport;
pub use http::HttpMailTransport;
pub use smtp::SmtpMailTransport;

use crate::domain::Envelope;
use crate::services::transport::TransportError;
use lettre::Address;
use lettre::message::Mailbox;
use uuid::Uuid;

/// Builds an RFC 5322 `Message-ID` scoped to the sender's domain.
pub(crate) fn generate_message_id(from: &str) -> String {
    let domain = from
        .rsplit_once('@')
        .map(|(_, d)| d.trim_end_matches('>').trim())
        .filter(|d| !d.is_empty())
        .unwrap_or("localhost");
    format!("<{}@{domain}>", Uuid::new_v4())
}

/// Builds the sender mailbox from its parts so the display name is quoted where needed.
pub(crate) fn sender_mailbox(envelope: &Envelope) -> Result<Mailbox, TransportError> {
    let address: Address = envelope
        .from_email
        .parse()
        .map_err(|e| TransportError::InvalidAddress(format!("{}: {e}", envelope.from_email)))?;
    let name = Some(envelope.from_name.clone()).filter(|n| !n.trim().is_empty());
    Ok(Mailbox::new(name, address))
}
