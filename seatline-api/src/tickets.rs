use axum::{
    extract::{Json, Path, State},
    routing::{get, post},
    Router,
};

use seatline_core::ticket::Ticket;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/tickets/{code}", get(find_ticket))
        .route("/v1/tickets/{code}/checkin", post(check_in))
}

async fn find_ticket(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Ticket>, AppError> {
    let ticket = state.orchestrator.find_ticket(&code).await?;
    Ok(Json(ticket))
}

/// A ticket boards once; a second check-in is a conflict.
async fn check_in(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Ticket>, AppError> {
    let ticket = state.orchestrator.check_in(&code).await?;
    Ok(Json(ticket))
}
