pub mod email;
pub mod rate_limit;
pub mod submission;

pub use email::{Envelope, RenderedEmail};
pub use rate_limit::ClientIdentity;
pub use submission::{Overrides, Submission, ValidationRules};

/// Identifier assigned to a message by the transport that accepted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: String,
}
