use crate::domain::{Overrides, Submission};
use serde::{Deserialize, Serialize};

/// Inbound contact-form body, accepted as JSON or URL-encoded form data.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default, alias = "reply_to")]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    /// Hidden honeypot field; humans leave it empty.
    #[serde(default)]
    pub website: Option<String>,
}

impl From<ContactRequest> for Submission {
    fn from(req: ContactRequest) -> Self {
        Self::new(req.name, req.email, req.message)
            .with_overrides(Overrides {
                to: req.to,
                from: req.from,
                subject: req.subject,
                reply_to: req.reply_to,
                html: req.html,
            })
            .with_honeypot(req.website)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl ContactResponse {
    #[must_use]
    pub fn sent(message_id: String) -> Self {
        Self { success: true, message: "Message sent successfully!".to_string(), message_id: Some(message_id), errors: None }
    }

    #[must_use]
    pub fn failure(message: &str, errors: Option<Vec<String>>) -> Self {
        Self { success: false, message: message.to_string(), message_id: None, errors }
    }
}
