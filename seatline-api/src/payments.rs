use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use seatline_core::payment::{GatewayKind, Payment};

use crate::error::AppError;
use crate::middleware::{ensure_owner, RequestHolder};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub booking_id: Uuid,
    pub gateway: GatewayKind,
}

#[derive(Debug, Serialize)]
pub struct PaymentSessionResponse {
    pub payment: Payment,
    pub payment_url: String,
    pub qr_code_url: Option<String>,
    pub expires_at: DateTime<Utc>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/payments", post(create_payment))
        .route("/v1/payments/{id}", get(payment_status))
        .route("/v1/payments/{id}/refund", post(refund_payment))
}

/// POST /v1/payments
async fn create_payment(
    State(state): State<AppState>,
    caller: RequestHolder,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentSessionResponse>), AppError> {
    let booking = state.orchestrator.get_booking(req.booking_id).await?;
    ensure_owner(&booking, &caller.holder)?;

    let session = state.reconciler.create_payment(booking.id, req.gateway).await?;
    Ok((
        StatusCode::CREATED,
        Json(PaymentSessionResponse {
            payment: session.payment,
            payment_url: session.payment_url,
            qr_code_url: session.qr_code_url,
            expires_at: session.expires_at,
        }),
    ))
}

/// GET /v1/payments/{id}
/// Polls the gateway while the payment is still pending.
async fn payment_status(
    State(state): State<AppState>,
    caller: RequestHolder,
    Path(id): Path<Uuid>,
) -> Result<Json<Payment>, AppError> {
    authorize(&state, &caller, id).await?;
    let payment = state.reconciler.check_payment_status(id).await?;
    Ok(Json(payment))
}

/// POST /v1/payments/{id}/refund
async fn refund_payment(
    State(state): State<AppState>,
    caller: RequestHolder,
    Path(id): Path<Uuid>,
) -> Result<Json<Payment>, AppError> {
    authorize(&state, &caller, id).await?;
    let payment = state.reconciler.refund_payment(id).await?;
    Ok(Json(payment))
}

async fn authorize(state: &AppState, caller: &RequestHolder, payment_id: Uuid) -> Result<(), AppError> {
    let payment = state.reconciler.get_payment(payment_id).await?;
    let booking = state.orchestrator.get_booking(payment.booking_id).await?;
    ensure_owner(&booking, &caller.holder)
}
