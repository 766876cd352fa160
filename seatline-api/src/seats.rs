use axum::{
    extract::{Json, Path, State},
    routing::get,
    Router,
};
use serde::Serialize;
use uuid::Uuid;

use seatline_core::seat::SeatView;

use crate::error::AppError;
use crate::state::AppState;
use crate::ws;

#[derive(Debug, Serialize)]
pub struct SeatMapResponse {
    pub trip_id: Uuid,
    pub seats: Vec<SeatView>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips/{id}/seats", get(seat_map))
        .route("/v1/trips/{id}/live", get(ws::live_seats))
}

/// GET /v1/trips/{id}/seats
async fn seat_map(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<SeatMapResponse>, AppError> {
    let seats = state.orchestrator.seat_map(trip_id).await?;
    Ok(Json(SeatMapResponse { trip_id, seats }))
}
