use crate::api::AppState;
use crate::api::schemas::contact::{ContactRequest, ContactResponse};
use crate::domain::{ClientIdentity, Submission};
use crate::error::{AppError, Result};
use axum::{
    Form, Json,
    extract::{ConnectInfo, FromRequest, Request, State},
    http::{HeaderMap, header},
    response::IntoResponse,
};
use std::net::SocketAddr;

/// Contact-form body from either a JSON or a URL-encoded form request.
#[derive(Debug)]
pub struct ContactForm(pub ContactRequest);

impl<S: Send + Sync> FromRequest<S> for ContactForm {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(body) = Form::<ContactRequest>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            Ok(Self(body))
        } else {
            let Json(body) = Json::<ContactRequest>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            Ok(Self(body))
        }
    }
}

/// Accepts a contact-form submission and relays it to the site owner.
///
/// # Errors
/// Returns `AppError::Validation` if any field is invalid.
/// Returns `AppError::RateLimited` if this client sent a message within the window.
/// Returns `AppError::Transport` if the message could not be delivered.
pub async fn submit(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ContactForm(payload): ContactForm,
) -> Result<impl IntoResponse> {
    let client_ip = state.rate_limit_service.extractor.identify_client_ip(&headers, peer.ip());
    let identity = ClientIdentity::from_ip(client_ip);

    let submission = Submission::from(payload);
    let sent = state.submission_service.dispatch(&identity, &submission).await?;

    Ok(Json(ContactResponse::sent(sent.message_id)))
}

pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
