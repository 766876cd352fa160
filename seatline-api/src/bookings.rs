use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use seatline_booking::NewBooking;
use seatline_core::booking::{Booking, ContactInfo};
use seatline_core::ticket::Ticket;
use seatline_core::Holder;

use crate::error::AppError;
use crate::middleware::{ensure_owner, RequestHolder};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub trip_id: Uuid,
    pub seat_numbers: Vec<String>,
    #[serde(default)]
    pub contact: ContactInfo,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmBookingRequest {
    pub payment_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ListBookingsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 { 1 }
fn default_limit() -> u32 { 20 }

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    #[serde(flatten)]
    pub booking: Booking,
    /// Present only when this request minted the caller's session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmedBookingResponse {
    pub booking: Booking,
    pub tickets: Vec<Ticket>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking).get(list_bookings))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
        .route("/v1/bookings/{id}/confirm", post(confirm_booking))
        .route("/v1/bookings/{id}/tickets", get(booking_tickets))
}

/// POST /v1/bookings
async fn create_booking(
    State(state): State<AppState>,
    caller: RequestHolder,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let booking = state
        .orchestrator
        .initiate_booking(NewBooking {
            trip_id: req.trip_id,
            seat_numbers: req.seat_numbers,
            holder: caller.holder.clone(),
            contact: req.contact,
        })
        .await?;

    info!("Booking {} created for {}", booking.id, booking.holder);

    Ok((
        StatusCode::CREATED,
        Json(BookingResponse {
            booking,
            session_id: caller.minted_session(),
        }),
    ))
}

/// GET /v1/bookings
async fn list_bookings(
    State(state): State<AppState>,
    caller: RequestHolder,
    Query(query): Query<ListBookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let user_id = match caller.holder {
        Holder::User(id) => id,
        Holder::Session(_) => {
            return Err(AppError::AuthenticationError(
                "listing bookings requires a signed-in user".to_string(),
            ))
        }
    };

    let bookings = state
        .orchestrator
        .list_user_bookings(user_id, query.page, query.limit)
        .await?;
    Ok(Json(bookings))
}

/// GET /v1/bookings/{id}
async fn get_booking(
    State(state): State<AppState>,
    caller: RequestHolder,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.orchestrator.get_booking(id).await?;
    ensure_owner(&booking, &caller.holder)?;
    Ok(Json(booking))
}

/// POST /v1/bookings/{id}/cancel
async fn cancel_booking(
    State(state): State<AppState>,
    caller: RequestHolder,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.orchestrator.get_booking(id).await?;
    ensure_owner(&booking, &caller.holder)?;

    let cancelled = state.orchestrator.cancel_booking(id).await?;
    Ok(Json(cancelled))
}

/// POST /v1/bookings/{id}/confirm
async fn confirm_booking(
    State(state): State<AppState>,
    caller: RequestHolder,
    Path(id): Path<Uuid>,
    Json(req): Json<ConfirmBookingRequest>,
) -> Result<Json<ConfirmedBookingResponse>, AppError> {
    let booking = state.orchestrator.get_booking(id).await?;
    ensure_owner(&booking, &caller.holder)?;

    let confirmed = state.orchestrator.confirm_booking(id, req.payment_id).await?;
    Ok(Json(ConfirmedBookingResponse {
        booking: confirmed.booking,
        tickets: confirmed.tickets,
    }))
}

/// GET /v1/bookings/{id}/tickets
async fn booking_tickets(
    State(state): State<AppState>,
    caller: RequestHolder,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Ticket>>, AppError> {
    let booking = state.orchestrator.get_booking(id).await?;
    ensure_owner(&booking, &caller.holder)?;

    let tickets = state.orchestrator.issue_tickets(id).await?;
    Ok(Json(tickets))
}
