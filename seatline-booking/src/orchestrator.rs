use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use seatline_core::booking::{Booking, BookingStatus, BookingTransition, ContactInfo};
use seatline_core::cache::{trip_seats_key, LockCache};
use seatline_core::payment::PaymentStatus;
use seatline_core::seat::{normalize_seat_numbers, SeatStatus, SeatView};
use seatline_core::ticket::Ticket;
use seatline_core::trip::SeatLayout;
use seatline_core::{CoreError, CoreResult, Holder};
use seatline_store::app_config::BusinessRules;

use crate::lock_manager::SeatLockManager;
use crate::notifier::SeatNotifier;
use crate::Repositories;

#[derive(Debug, Clone)]
pub struct BookingRules {
    pub seat_lock_duration: Duration,
    pub booking_expiry: Duration,
    pub seat_snapshot_ttl: Duration,
    pub currency: String,
    /// Upper bound on bookings expired per sweep tick.
    pub expiry_batch: i64,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            seat_lock_duration: Duration::from_secs(600),
            booking_expiry: Duration::from_secs(900),
            seat_snapshot_ttl: Duration::from_secs(30),
            currency: "VND".to_string(),
            expiry_batch: 500,
        }
    }
}

impl BookingRules {
    pub fn from_config(rules: &BusinessRules, currency: &str) -> Self {
        Self {
            seat_lock_duration: rules.seat_lock_duration(),
            booking_expiry: rules.booking_expiry(),
            seat_snapshot_ttl: rules.seat_snapshot_ttl(),
            currency: currency.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub trip_id: Uuid,
    pub seat_numbers: Vec<String>,
    pub holder: Holder,
    pub contact: ContactInfo,
}

#[derive(Debug, Clone)]
pub struct ConfirmedBooking {
    pub booking: Booking,
    pub tickets: Vec<Ticket>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryReport {
    pub expired: usize,
    pub skipped: usize,
}

/// Drives the booking lifecycle and the seat transitions that go with it.
pub struct BookingOrchestrator {
    repos: Repositories,
    cache: Arc<dyn LockCache>,
    locks: Arc<SeatLockManager>,
    notifier: SeatNotifier,
    rules: BookingRules,
}

impl BookingOrchestrator {
    pub fn new(repos: Repositories, cache: Arc<dyn LockCache>, rules: BookingRules) -> Self {
        let locks = Arc::new(SeatLockManager::new(cache.clone(), repos.seats.clone()));
        Self {
            notifier: SeatNotifier::new(cache.clone()),
            repos,
            cache,
            locks,
            rules,
        }
    }

    pub fn lock_manager(&self) -> Arc<SeatLockManager> {
        self.locks.clone()
    }

    pub fn rules(&self) -> &BookingRules {
        &self.rules
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Locks the seats and records a Pending booking that expires after the configured window.
    pub async fn initiate_booking(&self, request: NewBooking) -> CoreResult<Booking> {
        // 1. Trip must be open for sale
        let trip = self
            .repos
            .trips
            .find_by_id(request.trip_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("trip {}", request.trip_id)))?;
        if !trip.status.is_bookable() {
            return Err(CoreError::InvalidState(format!(
                "trip {} is {} and not open for booking",
                trip.id,
                trip.status.as_str()
            )));
        }

        // 2. Pending booking, built first so its id can own the seat locks
        let seats = normalize_seat_numbers(&request.seat_numbers)?;
        let expiry = chrono::Duration::from_std(self.rules.booking_expiry)
            .map_err(|_| CoreError::InternalError("booking expiry out of range".to_string()))?;
        let booking = Booking::new_pending(
            trip.id,
            request.holder.clone(),
            seats.clone(),
            trip.price,
            self.rules.currency.clone(),
            request.contact,
            Utc::now() + expiry,
        );

        // 3. Two-phase seat lock
        self.locks
            .lock_seats(trip.id, &seats, booking.id, &booking.holder, self.rules.seat_lock_duration)
            .await?;

        // 4. Persist
        if let Err(e) = self.repos.bookings.create(&booking).await {
            error!("Failed to create booking on trip {}, releasing seats: {}", trip.id, e);
            if let Err(release_err) = self.free_seats(&booking).await {
                error!("Failed to release seats after booking failure: {}", release_err);
            }
            return Err(e);
        }

        self.notifier.seats_changed(trip.id, &seats, SeatStatus::Locked).await;
        info!("Booking {} ({}) created for seats {:?}", booking.id, booking.booking_code, seats);
        Ok(booking)
    }

    /// Turns a paid booking into a confirmed one and issues its tickets.
    pub async fn confirm_booking(&self, booking_id: Uuid, payment_id: Uuid) -> CoreResult<ConfirmedBooking> {
        let booking = self.get_booking(booking_id).await?;
        if !matches!(booking.status, BookingStatus::Pending | BookingStatus::Paid) {
            return Err(CoreError::InvalidState(format!(
                "booking {} is {} and cannot be confirmed",
                booking.id,
                booking.status.as_str()
            )));
        }

        let payment = self
            .repos
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("payment {}", payment_id)))?;
        if payment.booking_id != booking.id {
            return Err(CoreError::InvalidState(format!(
                "payment {} does not belong to booking {}",
                payment.id, booking.id
            )));
        }
        if payment.status != PaymentStatus::Completed {
            return Err(CoreError::InvalidState(format!(
                "payment {} is {}, not completed",
                payment.id,
                payment.status.as_str()
            )));
        }

        // 1. Seats become Booked under row locks
        self.repos
            .seats
            .mark_booked(booking.trip_id, &booking.seats, booking.id)
            .await?;

        // 2. Guarded status change; a concurrent confirm loses here
        let transition = BookingTransition::new(&[BookingStatus::Pending, BookingStatus::Paid], BookingStatus::Confirmed);
        let confirmed = match self.repos.bookings.transition(booking.id, &transition).await? {
            Some(confirmed) => confirmed,
            None => return Err(self.abandon_confirmation(&booking).await),
        };

        // 3. Cache cleanup and fan-out
        self.locks.release_cache_locks(confirmed.trip_id, &confirmed.seats, &confirmed.holder).await;
        self.notifier.seats_changed(confirmed.trip_id, &confirmed.seats, SeatStatus::Booked).await;
        info!("Booking {} confirmed with payment {}", confirmed.id, payment.id);

        // 4. Tickets. Seat ownership stands even if this fails; issue_tickets retries.
        let tickets = self.create_missing_tickets(&confirmed).await.map_err(|e| {
            error!("Ticket issuance failed for confirmed booking {}: {}", confirmed.id, e);
            CoreError::InternalError(format!(
                "booking {} confirmed but ticket issuance failed: {}",
                confirmed.id, e
            ))
        })?;

        Ok(ConfirmedBooking { booking: confirmed, tickets })
    }

    /// The booking left Pending/Paid while its seats were being marked. If it was closed
    /// meanwhile, the seats just booked for it go back to Available.
    async fn abandon_confirmation(&self, booking: &Booking) -> CoreError {
        let current = match self.repos.bookings.find_by_id(booking.id).await {
            Ok(Some(current)) => current,
            Ok(None) => return CoreError::NotFound(format!("booking {}", booking.id)),
            Err(e) => return e,
        };

        if current.status.is_terminal() {
            if let Err(e) = self.free_seats(&current).await {
                error!("Failed to release seats of closed booking {}: {}", current.id, e);
            }
        }

        CoreError::InvalidState(format!(
            "booking {} is {} and cannot be confirmed",
            current.id,
            current.status.as_str()
        ))
    }

    /// Returns the tickets of a confirmed booking, creating any that are missing.
    pub async fn issue_tickets(&self, booking_id: Uuid) -> CoreResult<Vec<Ticket>> {
        let booking = self.get_booking(booking_id).await?;
        if booking.status != BookingStatus::Confirmed {
            return Err(CoreError::InvalidState(format!(
                "booking {} is {}, tickets are issued only for confirmed bookings",
                booking.id,
                booking.status.as_str()
            )));
        }
        self.create_missing_tickets(&booking).await
    }

    async fn create_missing_tickets(&self, booking: &Booking) -> CoreResult<Vec<Ticket>> {
        let existing = self.repos.tickets.list_by_booking(booking.id).await?;
        let missing: Vec<Ticket> = booking
            .seats
            .iter()
            .filter(|seat| !existing.iter().any(|t| &t.seat_number == *seat))
            .map(|seat| Ticket::issue(booking, seat))
            .collect();

        if missing.is_empty() {
            return Ok(existing);
        }

        let created = self.repos.tickets.create_batch(&missing).await?;
        info!("Issued {} tickets for booking {}", created, booking.id);
        self.repos.tickets.list_by_booking(booking.id).await
    }

    pub async fn cancel_booking(&self, booking_id: Uuid) -> CoreResult<Booking> {
        let booking = self.get_booking(booking_id).await?;
        if !booking.status.can_transition_to(BookingStatus::Cancelled) {
            return Err(CoreError::InvalidState(format!(
                "booking {} is already {}",
                booking.id,
                booking.status.as_str()
            )));
        }

        let cancelled = self.retire(&booking, BookingStatus::Cancelled).await?;
        info!("Booking {} cancelled", cancelled.id);
        Ok(cancelled)
    }

    /// Expires one Pending booking whose window has passed.
    pub async fn expire_booking(&self, booking_id: Uuid) -> CoreResult<Booking> {
        let booking = self.get_booking(booking_id).await?;
        if !booking.is_expired(Utc::now()) {
            return Err(CoreError::InvalidState(format!(
                "booking {} is {} and has not expired",
                booking.id,
                booking.status.as_str()
            )));
        }

        let expired = self.retire(&booking, BookingStatus::Expired).await?;
        info!("Booking {} expired", expired.id);
        Ok(expired)
    }

    /// Sweeps every overdue Pending booking into Expired. Failures are skipped and
    /// picked up again on the next run.
    pub async fn expire_old_bookings(&self) -> CoreResult<ExpiryReport> {
        let overdue = self.repos.bookings.list_expired(Utc::now(), self.rules.expiry_batch).await?;
        let mut report = ExpiryReport::default();

        for booking in overdue {
            match self.retire(&booking, BookingStatus::Expired).await {
                Ok(_) => report.expired += 1,
                Err(e) => {
                    warn!("Skipping expiry of booking {}: {}", booking.id, e);
                    report.skipped += 1;
                }
            }
        }

        if report.expired > 0 || report.skipped > 0 {
            info!("Expiry sweep: {} expired, {} skipped", report.expired, report.skipped);
        }
        Ok(report)
    }

    /// Paid or Confirmed booking to Refunded, releasing its seats.
    pub async fn refund_booking(&self, booking_id: Uuid) -> CoreResult<Booking> {
        let booking = self.get_booking(booking_id).await?;
        if !booking.status.can_transition_to(BookingStatus::Refunded) {
            return Err(CoreError::InvalidState(format!(
                "booking {} is {} and cannot be refunded",
                booking.id,
                booking.status.as_str()
            )));
        }

        let refunded = self.retire(&booking, BookingStatus::Refunded).await?;
        info!("Booking {} refunded", refunded.id);
        Ok(refunded)
    }

    /// Pending to Paid after a completed payment. `None` if the booking moved on meanwhile.
    pub async fn mark_paid(&self, booking_id: Uuid) -> CoreResult<Option<Booking>> {
        let transition = BookingTransition::new(&[BookingStatus::Pending], BookingStatus::Paid);
        let paid = self.repos.bookings.transition(booking_id, &transition).await?;
        match &paid {
            Some(_) => info!("Booking {} marked as paid", booking_id),
            None => warn!("Booking {} is no longer pending; payment recorded without advancing it", booking_id),
        }
        Ok(paid)
    }

    /// Guarded move into a terminal status followed by the seat release.
    ///
    /// The status goes first so a booking that lost a race never frees seats
    /// another path just booked.
    async fn retire(&self, booking: &Booking, to: BookingStatus) -> CoreResult<Booking> {
        let transition = BookingTransition::new(&[booking.status], to);
        let retired = self
            .repos
            .bookings
            .transition(booking.id, &transition)
            .await?
            .ok_or_else(|| CoreError::InvalidState(format!("booking {} changed concurrently", booking.id)))?;

        let released = self
            .free_seats(&retired)
            .await
            .inspect_err(|e| error!("Booking {} is {} but its seats were not released: {}", retired.id, to.as_str(), e))?;

        info!("Released {} seats of booking {}", released.len(), retired.id);
        Ok(retired)
    }

    /// Releases the seats this booking still owns in the store, then their cache locks.
    /// A seat whose lock lapsed and was taken by a newer booking is not touched, even
    /// when both bookings share a holder.
    async fn free_seats(&self, booking: &Booking) -> CoreResult<Vec<String>> {
        let released = self
            .repos
            .seats
            .release_seats(booking.trip_id, &booking.seats, booking.id)
            .await?;

        if !released.is_empty() {
            self.locks.release_cache_locks(booking.trip_id, &released, &booking.holder).await;
            self.notifier.seats_changed(booking.trip_id, &released, SeatStatus::Available).await;
        }
        Ok(released)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get_booking(&self, booking_id: Uuid) -> CoreResult<Booking> {
        self.repos
            .bookings
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("booking {}", booking_id)))
    }

    pub async fn list_user_bookings(&self, user_id: Uuid, page: u32, limit: u32) -> CoreResult<Vec<Booking>> {
        let limit = limit.clamp(1, 100) as i64;
        let offset = page.saturating_sub(1) as i64 * limit;
        self.repos.bookings.list_by_user(user_id, limit, offset).await
    }

    /// Seat map with lazy expiry applied, served from a short-lived snapshot when possible.
    pub async fn seat_map(&self, trip_id: Uuid) -> CoreResult<Vec<SeatView>> {
        let key = trip_seats_key(trip_id);
        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<SeatView>>(&raw) {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => warn!("Discarding unreadable seat snapshot for trip {}: {}", trip_id, e),
            },
            Ok(None) => {}
            Err(e) => warn!("Seat snapshot unavailable for trip {}: {}", trip_id, e),
        }

        if self.repos.trips.find_by_id(trip_id).await?.is_none() {
            return Err(CoreError::NotFound(format!("trip {}", trip_id)));
        }

        let now = Utc::now();
        let seats: Vec<SeatView> = self
            .repos
            .seats
            .list_by_trip(trip_id)
            .await?
            .iter()
            .map(|seat| seat.view(now))
            .collect();

        match serde_json::to_string(&seats) {
            Ok(raw) => {
                if let Err(e) = self.cache.set(&key, &raw, self.rules.seat_snapshot_ttl).await {
                    warn!("Failed to cache seat snapshot for trip {}: {}", trip_id, e);
                }
            }
            Err(e) => warn!("Failed to encode seat snapshot for trip {}: {}", trip_id, e),
        }

        Ok(seats)
    }

    /// Creates one Available seat row per seat in the bus layout.
    pub async fn initialize_trip_seats(&self, trip_id: Uuid, layout: &SeatLayout) -> CoreResult<u64> {
        let seat_numbers = layout.seat_numbers();
        if seat_numbers.is_empty() {
            return Err(CoreError::ValidationError("seat layout contains no seats".to_string()));
        }
        let created = self.repos.seats.initialize_seats(trip_id, &seat_numbers).await?;
        self.notifier.invalidate(trip_id).await;
        info!("Initialized {} seats for trip {}", created, trip_id);
        Ok(created)
    }

    pub async fn find_ticket(&self, code: &str) -> CoreResult<Ticket> {
        self.repos
            .tickets
            .find_by_code(code)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("ticket {}", code)))
    }

    /// Boards a ticket once. Tickets of a booking that was cancelled or refunded after
    /// confirmation are void, since their seats may have been sold again.
    pub async fn check_in(&self, code: &str) -> CoreResult<Ticket> {
        let ticket = self.find_ticket(code).await?;
        let booking = self.get_booking(ticket.booking_id).await?;
        if booking.status != BookingStatus::Confirmed {
            return Err(CoreError::InvalidState(format!(
                "ticket {} belongs to booking {} which is {}",
                ticket.ticket_code,
                booking.id,
                booking.status.as_str()
            )));
        }

        let ticket = self.repos.tickets.check_in(code, Utc::now()).await?;
        info!("Ticket {} checked in for seat {}", ticket.ticket_code, ticket.seat_number);
        Ok(ticket)
    }
}
