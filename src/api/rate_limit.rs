use crate::api::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

/// Records request-governor decisions.
///
/// Send-window throttles carry no `x-ratelimit-after` header and are already
/// counted by the rate-limit service, so they are skipped here.
pub async fn log_rate_limit_events(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;

    let governor_after =
        response.headers().get("x-ratelimit-after").and_then(|v| v.to_str().ok()).map(str::to_string);

    if response.status() == StatusCode::TOO_MANY_REQUESTS && governor_after.is_none() {
        return response;
    }

    state.rate_limit_service.log_decision(response.status(), governor_after);
    response
}
