use axum::http::{HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

const MAX_REQUEST_ID_LEN: usize = 128;

/// Reuses a caller-supplied `x-request-id` when it is sane, otherwise mints a UUID.
#[derive(Clone, Copy, Debug, Default)]
pub struct MakeRequestUuidOrHeader;

impl MakeRequestId for MakeRequestUuidOrHeader {
    fn make_request_id<B>(&mut self, request: &Request<B>) -> Option<RequestId> {
        if let Some(existing) = request.headers().get("x-request-id")
            && !existing.is_empty()
            && existing.len() <= MAX_REQUEST_ID_LEN
            && existing.as_bytes().iter().all(u8::is_ascii_graphic)
        {
            return Some(RequestId::new(existing.clone()));
        }

        HeaderValue::from_str(&Uuid::new_v4().to_string()).ok().map(RequestId::new)
    }
}
