use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::{Booking, BookingTransition};
use crate::payment::{Payment, PaymentOutcome, PaymentStatus};
use crate::seat::Seat;
use crate::ticket::Ticket;
use crate::trip::Trip;
use crate::CoreResult;

/// Durable seat state. `lock_seats` and `mark_booked` must run as one transaction
/// holding exclusive row locks on the requested seats.
#[async_trait]
pub trait SeatStore: Send + Sync {
    async fn initialize_seats(&self, trip_id: Uuid, seat_numbers: &[String]) -> CoreResult<u64>;

    async fn list_by_trip(&self, trip_id: Uuid) -> CoreResult<Vec<Seat>>;

    /// All-or-nothing: NotFound when a seat row is missing, Conflict when any seat is
    /// booked or holds a live lock. Locked rows record `booking_id` as their owner.
    async fn lock_seats(
        &self,
        trip_id: Uuid,
        seat_numbers: &[String],
        booking_id: Uuid,
        holder: &str,
        locked_until: DateTime<Utc>,
    ) -> CoreResult<()>;

    /// Flips Locked rows back to Available. Rows in any other status are left alone.
    async fn unlock_seats(&self, trip_id: Uuid, seat_numbers: &[String]) -> CoreResult<u64>;

    /// Conflict unless every seat is free or already owned by `booking_id`.
    async fn mark_booked(&self, trip_id: Uuid, seat_numbers: &[String], booking_id: Uuid) -> CoreResult<()>;

    /// Frees the seats `booking_id` still owns, locked or booked, and returns their numbers.
    /// Seats since taken over by another booking are left alone.
    async fn release_seats(
        &self,
        trip_id: Uuid,
        seat_numbers: &[String],
        booking_id: Uuid,
    ) -> CoreResult<Vec<String>>;

    async fn sweep_expired_locks(&self, now: DateTime<Utc>) -> CoreResult<u64>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn create(&self, booking: &Booking) -> CoreResult<()>;

    async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<Booking>>;

    async fn list_by_user(&self, user_id: Uuid, limit: i64, offset: i64) -> CoreResult<Vec<Booking>>;

    /// Pending bookings whose `expires_at` is before `now`.
    async fn list_expired(&self, now: DateTime<Utc>, limit: i64) -> CoreResult<Vec<Booking>>;

    /// Compare-and-set on status. Returns `None` when the current status is not in
    /// `transition.from`.
    async fn transition(&self, id: Uuid, transition: &BookingTransition) -> CoreResult<Option<Booking>>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Conflict when the booking already has a non-failed payment or the
    /// idempotency key / gateway id is taken.
    async fn create(&self, payment: &Payment) -> CoreResult<()>;

    async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<Payment>>;

    async fn find_by_gateway_id(&self, gateway_payment_id: &str) -> CoreResult<Option<Payment>>;

    async fn find_latest_by_booking(&self, booking_id: Uuid) -> CoreResult<Option<Payment>>;

    /// Moves a Pending payment to the outcome's status. `None` if it was no longer Pending.
    async fn settle(&self, id: Uuid, outcome: &PaymentOutcome) -> CoreResult<Option<Payment>>;

    /// Status compare-and-set used for refunds.
    async fn update_status(&self, id: Uuid, from: PaymentStatus, to: PaymentStatus) -> CoreResult<Option<Payment>>;
}

#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Inserts tickets, skipping seats that already have one for the same booking.
    async fn create_batch(&self, tickets: &[Ticket]) -> CoreResult<u64>;

    async fn list_by_booking(&self, booking_id: Uuid) -> CoreResult<Vec<Ticket>>;

    async fn find_by_code(&self, code: &str) -> CoreResult<Option<Ticket>>;

    /// Conflict when the ticket was already checked in.
    async fn check_in(&self, code: &str, at: DateTime<Utc>) -> CoreResult<Ticket>;
}

#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<Trip>>;
}
