//! In-process backends with the same contracts as Postgres and Redis.
//!
//! A single `tokio::sync::Mutex` per store gives every operation the
//! all-or-nothing behaviour a database transaction provides. Used by tests and
//! by local runs without infrastructure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use seatline_core::booking::{Booking, BookingTransition};
use seatline_core::cache::{LockCache, RateLimiter};
use seatline_core::payment::{Payment, PaymentOutcome, PaymentStatus};
use seatline_core::repository::{
    BookingRepository, PaymentRepository, SeatStore, TicketRepository, TripRepository,
};
use seatline_core::seat::{ensure_all_bookable, ensure_all_lockable, Seat, SeatStatus};
use seatline_core::ticket::Ticket;
use seatline_core::trip::Trip;
use seatline_core::{CoreError, CoreResult};

// ============================================================================
// Cache
// ============================================================================

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live keys starting with `prefix`.
    pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && e.live(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .lock()
            .await
            .get(channel)
            .map_or(0, |tx| tx.receiver_count())
    }
}

#[async_trait]
impl LockCache for MemoryCache {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|e| e.live(now)) {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry { value: value.to_string(), expires_at: now + ttl });
        Ok(true)
    }

    async fn get(&self, key: &str) -> CoreResult<Option<String>> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries.get(key).filter(|e| e.live(now)).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CoreResult<()> {
        let expires_at = Instant::now() + ttl;
        self.entries
            .lock()
            .await
            .insert(key.to_string(), Entry { value: value.to_string(), expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> CoreResult<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn release(&self, key: &str, owner: &str) -> CoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|e| e.live(now) && e.value == owner) {
            entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn publish(&self, channel: &str, payload: &str) -> CoreResult<()> {
        if let Some(tx) = self.channels.lock().await.get(channel) {
            // No receivers is not an error, same as Redis PUBLISH returning 0.
            let _ = tx.send(payload.to_string());
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> CoreResult<BoxStream<'static, String>> {
        let mut channels = self.channels.lock().await;
        let tx = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(1024).0);
        let stream = BroadcastStream::new(tx.subscribe()).filter_map(|msg| async move { msg.ok() });
        Ok(stream.boxed())
    }
}

#[async_trait]
impl RateLimiter for MemoryCache {
    async fn check_rate_limit(&self, key: &str, limit: i64, window: Duration) -> CoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let count = match entries.get(key).filter(|e| e.live(now)) {
            Some(entry) => entry.value.parse::<i64>().unwrap_or(0) + 1,
            None => 1,
        };
        let expires_at = entries
            .get(key)
            .filter(|e| e.live(now))
            .map_or(now + window, |e| e.expires_at);
        entries.insert(key.to_string(), Entry { value: count.to_string(), expires_at });
        Ok(count <= limit)
    }
}

// ============================================================================
// Seat store
// ============================================================================

#[derive(Default)]
pub struct MemorySeatStore {
    seats: Mutex<HashMap<(Uuid, String), Seat>>,
}

impl MemorySeatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, trip_id: Uuid, seat_number: &str) -> Option<Seat> {
        self.seats.lock().await.get(&(trip_id, seat_number.to_string())).cloned()
    }
}

fn collect_rows(
    seats: &HashMap<(Uuid, String), Seat>,
    trip_id: Uuid,
    seat_numbers: &[String],
) -> Vec<Seat> {
    seat_numbers
        .iter()
        .filter_map(|n| seats.get(&(trip_id, n.clone())).cloned())
        .collect()
}

fn reset(seat: &mut Seat, now: DateTime<Utc>) {
    seat.status = SeatStatus::Available;
    seat.locked_until = None;
    seat.locked_by = None;
    seat.booking_id = None;
    seat.updated_at = now;
}

#[async_trait]
impl SeatStore for MemorySeatStore {
    async fn initialize_seats(&self, trip_id: Uuid, seat_numbers: &[String]) -> CoreResult<u64> {
        let mut seats = self.seats.lock().await;
        let mut created = 0;
        for number in seat_numbers {
            seats.entry((trip_id, number.clone())).or_insert_with(|| {
                created += 1;
                Seat::available(trip_id, number.clone())
            });
        }
        Ok(created)
    }

    async fn list_by_trip(&self, trip_id: Uuid) -> CoreResult<Vec<Seat>> {
        let seats = self.seats.lock().await;
        let mut rows: Vec<Seat> = seats.values().filter(|s| s.trip_id == trip_id).cloned().collect();
        rows.sort_by(|a, b| a.seat_number.cmp(&b.seat_number));
        Ok(rows)
    }

    async fn lock_seats(
        &self,
        trip_id: Uuid,
        seat_numbers: &[String],
        booking_id: Uuid,
        holder: &str,
        locked_until: DateTime<Utc>,
    ) -> CoreResult<()> {
        let now = Utc::now();
        let mut seats = self.seats.lock().await;
        let rows = collect_rows(&seats, trip_id, seat_numbers);
        ensure_all_lockable(&rows, seat_numbers, now)?;

        for number in seat_numbers {
            if let Some(seat) = seats.get_mut(&(trip_id, number.clone())) {
                seat.status = SeatStatus::Locked;
                seat.locked_until = Some(locked_until);
                seat.locked_by = Some(holder.to_string());
                seat.booking_id = Some(booking_id);
                seat.updated_at = now;
            }
        }
        Ok(())
    }

    async fn unlock_seats(&self, trip_id: Uuid, seat_numbers: &[String]) -> CoreResult<u64> {
        let now = Utc::now();
        let mut seats = self.seats.lock().await;
        let mut changed = 0;
        for number in seat_numbers {
            if let Some(seat) = seats.get_mut(&(trip_id, number.clone())) {
                if seat.status == SeatStatus::Locked {
                    reset(seat, now);
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn mark_booked(&self, trip_id: Uuid, seat_numbers: &[String], booking_id: Uuid) -> CoreResult<()> {
        let now = Utc::now();
        let mut seats = self.seats.lock().await;
        let rows = collect_rows(&seats, trip_id, seat_numbers);
        ensure_all_bookable(&rows, seat_numbers, booking_id, now)?;

        for number in seat_numbers {
            if let Some(seat) = seats.get_mut(&(trip_id, number.clone())) {
                seat.status = SeatStatus::Booked;
                seat.booking_id = Some(booking_id);
                seat.locked_until = None;
                seat.locked_by = None;
                seat.updated_at = now;
            }
        }
        Ok(())
    }

    async fn release_seats(
        &self,
        trip_id: Uuid,
        seat_numbers: &[String],
        booking_id: Uuid,
    ) -> CoreResult<Vec<String>> {
        let now = Utc::now();
        let mut seats = self.seats.lock().await;
        let mut released = Vec::new();
        for number in seat_numbers {
            if let Some(seat) = seats.get_mut(&(trip_id, number.clone())) {
                if seat.booking_id == Some(booking_id) {
                    reset(seat, now);
                    released.push(number.clone());
                }
            }
        }
        Ok(released)
    }

    async fn sweep_expired_locks(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let mut seats = self.seats.lock().await;
        let mut changed = 0;
        for seat in seats.values_mut() {
            if seat.status == SeatStatus::Locked && seat.locked_until.is_some_and(|until| until < now) {
                reset(seat, Utc::now());
                changed += 1;
            }
        }
        Ok(changed)
    }
}

// ============================================================================
// Bookings
// ============================================================================

#[derive(Default)]
pub struct MemoryBookingRepository {
    bookings: Mutex<HashMap<Uuid, Booking>>,
}

impl MemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a booking as-is; lets tests age a booking past its expiry.
    pub async fn put(&self, booking: Booking) {
        self.bookings.lock().await.insert(booking.id, booking);
    }
}

#[async_trait]
impl BookingRepository for MemoryBookingRepository {
    async fn create(&self, booking: &Booking) -> CoreResult<()> {
        let mut bookings = self.bookings.lock().await;
        if bookings.contains_key(&booking.id)
            || bookings.values().any(|b| b.booking_code == booking.booking_code)
        {
            return Err(CoreError::Conflict(format!("booking {} already exists", booking.id)));
        }
        bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<Booking>> {
        Ok(self.bookings.lock().await.get(&id).cloned())
    }

    async fn list_by_user(&self, user_id: Uuid, limit: i64, offset: i64) -> CoreResult<Vec<Booking>> {
        let bookings = self.bookings.lock().await;
        let mut rows: Vec<Booking> = bookings
            .values()
            .filter(|b| b.user_id == Some(user_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn list_expired(&self, now: DateTime<Utc>, limit: i64) -> CoreResult<Vec<Booking>> {
        let bookings = self.bookings.lock().await;
        let mut rows: Vec<Booking> = bookings.values().filter(|b| b.is_expired(now)).cloned().collect();
        rows.sort_by_key(|b| b.expires_at);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn transition(&self, id: Uuid, transition: &BookingTransition) -> CoreResult<Option<Booking>> {
        let mut bookings = self.bookings.lock().await;
        let Some(booking) = bookings.get_mut(&id) else {
            return Ok(None);
        };
        if transition.apply(booking) {
            Ok(Some(booking.clone()))
        } else {
            Ok(None)
        }
    }
}

// ============================================================================
// Payments
// ============================================================================

#[derive(Default)]
pub struct MemoryPaymentRepository {
    payments: Mutex<Vec<Payment>>,
}

impl MemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentRepository for MemoryPaymentRepository {
    async fn create(&self, payment: &Payment) -> CoreResult<()> {
        let mut payments = self.payments.lock().await;
        let duplicate = payments.iter().any(|p| {
            p.gateway_payment_id == payment.gateway_payment_id
                || p.idempotency_key == payment.idempotency_key
                || (p.booking_id == payment.booking_id && p.status != PaymentStatus::Failed)
        });
        if duplicate {
            return Err(CoreError::Conflict(format!(
                "payment already exists for booking {}",
                payment.booking_id
            )));
        }
        payments.push(payment.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<Payment>> {
        Ok(self.payments.lock().await.iter().find(|p| p.id == id).cloned())
    }

    async fn find_by_gateway_id(&self, gateway_payment_id: &str) -> CoreResult<Option<Payment>> {
        Ok(self
            .payments
            .lock()
            .await
            .iter()
            .find(|p| p.gateway_payment_id == gateway_payment_id)
            .cloned())
    }

    async fn find_latest_by_booking(&self, booking_id: Uuid) -> CoreResult<Option<Payment>> {
        // max_by_key keeps the last of equal keys, so insertion order breaks ties.
        Ok(self
            .payments
            .lock()
            .await
            .iter()
            .filter(|p| p.booking_id == booking_id)
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn settle(&self, id: Uuid, outcome: &PaymentOutcome) -> CoreResult<Option<Payment>> {
        let mut payments = self.payments.lock().await;
        match payments.iter_mut().find(|p| p.id == id && p.status == PaymentStatus::Pending) {
            Some(payment) => {
                outcome.apply(payment);
                Ok(Some(payment.clone()))
            }
            None => Ok(None),
        }
    }

    async fn update_status(&self, id: Uuid, from: PaymentStatus, to: PaymentStatus) -> CoreResult<Option<Payment>> {
        let mut payments = self.payments.lock().await;
        match payments.iter_mut().find(|p| p.id == id && p.status == from) {
            Some(payment) => {
                payment.status = to;
                payment.updated_at = Utc::now();
                Ok(Some(payment.clone()))
            }
            None => Ok(None),
        }
    }
}

// ============================================================================
// Tickets
// ============================================================================

#[derive(Default)]
pub struct MemoryTicketRepository {
    tickets: Mutex<Vec<Ticket>>,
}

impl MemoryTicketRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TicketRepository for MemoryTicketRepository {
    async fn create_batch(&self, tickets: &[Ticket]) -> CoreResult<u64> {
        let mut stored = self.tickets.lock().await;
        let mut inserted = 0;
        for ticket in tickets {
            let exists = stored
                .iter()
                .any(|t| t.booking_id == ticket.booking_id && t.seat_number == ticket.seat_number);
            if !exists {
                stored.push(ticket.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn list_by_booking(&self, booking_id: Uuid) -> CoreResult<Vec<Ticket>> {
        let mut rows: Vec<Ticket> = self
            .tickets
            .lock()
            .await
            .iter()
            .filter(|t| t.booking_id == booking_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.seat_number.cmp(&b.seat_number));
        Ok(rows)
    }

    async fn find_by_code(&self, code: &str) -> CoreResult<Option<Ticket>> {
        Ok(self.tickets.lock().await.iter().find(|t| t.ticket_code == code).cloned())
    }

    async fn check_in(&self, code: &str, at: DateTime<Utc>) -> CoreResult<Ticket> {
        let mut tickets = self.tickets.lock().await;
        let ticket = tickets
            .iter_mut()
            .find(|t| t.ticket_code == code)
            .ok_or_else(|| CoreError::NotFound(format!("ticket {}", code)))?;
        ticket.check_in(at)?;
        Ok(ticket.clone())
    }
}

// ============================================================================
// Trips
// ============================================================================

#[derive(Default)]
pub struct MemoryTripRepository {
    trips: Mutex<HashMap<Uuid, Trip>>,
}

impl MemoryTripRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, trip: Trip) {
        self.trips.lock().await.insert(trip.id, trip);
    }
}

#[async_trait]
impl TripRepository for MemoryTripRepository {
    async fn find_by_id(&self, id: Uuid) -> CoreResult<Option<Trip>> {
        Ok(self.trips.lock().await.get(&id).cloned())
    }
}
