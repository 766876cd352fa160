use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

use seatline_core::payment::GatewayKind;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/{gateway}", post(handle_webhook))
}

/// POST /v1/webhooks/{gateway}
/// Gateways sign the raw body, so it is verified before any parsing.
async fn handle_webhook(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    match process(&state, &gateway, &headers, &body).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "success" }))),
        Err(err) => {
            let status = err.status();
            let message = err.message();
            tracing::warn!("Webhook from {} rejected ({}): {}", gateway, status, message);
            (status, Json(json!({ "status": "error", "message": message })))
        }
    }
}

async fn process(state: &AppState, gateway: &str, headers: &HeaderMap, body: &[u8]) -> Result<(), AppError> {
    // 1. Resolve the gateway and its signature header
    let kind: GatewayKind = gateway.parse()?;
    let signature = headers
        .get(kind.signature_header())
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            AppError::AuthenticationError(format!("missing {} header", kind.signature_header()))
        })?;

    // 2. Verify, decode and settle
    let payment = state.reconciler.handle_webhook(kind, signature, body).await?;
    tracing::info!(
        "Webhook from {} processed for payment {} ({})",
        kind,
        payment.id,
        payment.status.as_str()
    );
    Ok(())
}
