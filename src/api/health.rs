use crate::api::MgmtState;
use crate::api::schemas::health::HealthResponse;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

/// Liveness probe: returns 200 OK as long as the server is running.
pub async fn livez() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe: checks the mail transport and the rate-limit store.
pub async fn readyz(State(state): State<MgmtState>) -> impl IntoResponse {
    let (transport_res, store_res) =
        tokio::join!(state.health_service.check_transport(), state.health_service.check_store());

    let mut status_code = StatusCode::OK;
    let transport_status = if let Err(e) = transport_res {
        tracing::warn!(error = %e, component = "transport", "Readiness probe failed");
        status_code = StatusCode::SERVICE_UNAVAILABLE;
        "error"
    } else {
        "ok"
    };

    let store_status = if let Err(e) = store_res {
        tracing::warn!(error = %e, component = "rate_limit_store", "Readiness probe failed");
        status_code = StatusCode::SERVICE_UNAVAILABLE;
        "error"
    } else {
        "ok"
    };

    let response = HealthResponse {
        status: if status_code == StatusCode::OK { "ok" } else { "error" }.to_string(),
        transport: transport_status.to_string(),
        rate_limit_store: store_status.to_string(),
    };

    (status_code, Json(response))
}
