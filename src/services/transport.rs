use crate::domain::Envelope;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Failed to build message: {0}")]
    Build(String),
    #[error("SMTP error: {0}")]
    Smtp(String),
    #[error("HTTP mail API error: {0}")]
    Http(String),
    #[error("Mail API rejected the message with status {status}")]
    Rejected { status: u16 },
    #[error("Transport did not respond in time")]
    Timeout,
}

#[async_trait]
pub trait MailTransport: Send + Sync + std::fmt::Debug {
    /// Hands an envelope to the outbound mail system.
    ///
    /// # Errors
    /// Returns a `TransportError` if the message could not be built or was not accepted.
    async fn send(&self, envelope: &Envelope) -> Result<String, TransportError>;

    /// Checks that the transport is reachable.
    ///
    /// # Errors
    /// Returns a `TransportError` describing why the transport is unavailable.
    async fn check(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
