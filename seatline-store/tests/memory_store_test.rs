use chrono::{Duration, Utc};
use uuid::Uuid;

use seatline_core::booking::{Booking, BookingStatus, BookingTransition, ContactInfo};
use seatline_core::repository::{BookingRepository, SeatStore, TicketRepository};
use seatline_core::seat::SeatStatus;
use seatline_core::ticket::Ticket;
use seatline_core::{CoreError, Holder};
use seatline_store::memory::{MemoryBookingRepository, MemorySeatStore, MemoryTicketRepository};

fn labels(seats: &[&str]) -> Vec<String> {
    seats.iter().map(|s| s.to_string()).collect()
}

async fn seat_store(trip_id: Uuid) -> MemorySeatStore {
    let store = MemorySeatStore::new();
    let created = store.initialize_seats(trip_id, &labels(&["A1", "A2", "B1"])).await.unwrap();
    assert_eq!(created, 3);
    store
}

fn pending_booking(trip_id: Uuid, seats: &[&str]) -> Booking {
    Booking::new_pending(
        trip_id,
        Holder::new_session(),
        labels(seats),
        100_000,
        "VND",
        ContactInfo::default(),
        Utc::now() + Duration::minutes(15),
    )
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let trip_id = Uuid::new_v4();
    let store = seat_store(trip_id).await;
    let again = store.initialize_seats(trip_id, &labels(&["A1", "C1"])).await.unwrap();
    assert_eq!(again, 1);
    assert_eq!(store.list_by_trip(trip_id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_lock_is_all_or_nothing() {
    let trip_id = Uuid::new_v4();
    let store = seat_store(trip_id).await;
    let until = Utc::now() + Duration::minutes(10);

    store.lock_seats(trip_id, &labels(&["A1"]), Uuid::new_v4(), "session:one", until).await.unwrap();

    let err = store
        .lock_seats(trip_id, &labels(&["A2", "A1"]), Uuid::new_v4(), "session:two", until)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    assert_eq!(store.get(trip_id, "A2").await.unwrap().status, SeatStatus::Available);

    let err = store
        .lock_seats(trip_id, &labels(&["A2", "Z9"]), Uuid::new_v4(), "session:two", until)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
    assert_eq!(store.get(trip_id, "A2").await.unwrap().status, SeatStatus::Available);
}

#[tokio::test]
async fn test_expired_lock_can_be_taken_and_swept() {
    let trip_id = Uuid::new_v4();
    let store = seat_store(trip_id).await;
    let past = Utc::now() - Duration::seconds(1);

    store.lock_seats(trip_id, &labels(&["A1", "A2"]), Uuid::new_v4(), "session:one", past).await.unwrap();

    // A lapsed lock does not block a new holder
    let until = Utc::now() + Duration::minutes(10);
    store.lock_seats(trip_id, &labels(&["A1"]), Uuid::new_v4(), "session:two", until).await.unwrap();
    let a1 = store.get(trip_id, "A1").await.unwrap();
    assert_eq!(a1.locked_by.as_deref(), Some("session:two"));

    // Only the lapsed row is reset by the sweep
    assert_eq!(store.sweep_expired_locks(Utc::now()).await.unwrap(), 1);
    assert_eq!(store.get(trip_id, "A2").await.unwrap().status, SeatStatus::Available);
    assert_eq!(store.get(trip_id, "A1").await.unwrap().status, SeatStatus::Locked);
}

#[tokio::test]
async fn test_book_and_release_only_touch_owned_seats() {
    let trip_id = Uuid::new_v4();
    let store = seat_store(trip_id).await;
    let until = Utc::now() + Duration::minutes(10);
    let booking_id = Uuid::new_v4();
    let other_booking = Uuid::new_v4();

    store.lock_seats(trip_id, &labels(&["A1", "A2"]), booking_id, "session:one", until).await.unwrap();
    store.lock_seats(trip_id, &labels(&["B1"]), other_booking, "session:two", until).await.unwrap();

    // Someone else's lock cannot be booked
    let err = store.mark_booked(trip_id, &labels(&["B1"]), booking_id).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));

    store.mark_booked(trip_id, &labels(&["A1", "A2"]), booking_id).await.unwrap();
    assert_eq!(store.get(trip_id, "A1").await.unwrap().booking_id, Some(booking_id));

    // Unlock leaves booked rows alone
    assert_eq!(store.unlock_seats(trip_id, &labels(&["A1"])).await.unwrap(), 0);

    let released = store
        .release_seats(trip_id, &labels(&["A1", "A2", "B1"]), booking_id)
        .await
        .unwrap();
    assert_eq!(released, labels(&["A1", "A2"]));
    assert_eq!(store.get(trip_id, "B1").await.unwrap().status, SeatStatus::Locked);
}

#[tokio::test]
async fn test_release_spares_same_holders_newer_lock() {
    let trip_id = Uuid::new_v4();
    let store = seat_store(trip_id).await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    // The first lock lapses and the same holder locks the seat again for a new booking
    store
        .lock_seats(trip_id, &labels(&["A1"]), first, "user:1", Utc::now() - Duration::seconds(1))
        .await
        .unwrap();
    store
        .lock_seats(trip_id, &labels(&["A1"]), second, "user:1", Utc::now() + Duration::minutes(10))
        .await
        .unwrap();

    assert!(store.release_seats(trip_id, &labels(&["A1"]), first).await.unwrap().is_empty());
    let a1 = store.get(trip_id, "A1").await.unwrap();
    assert_eq!(a1.status, SeatStatus::Locked);
    assert_eq!(a1.booking_id, Some(second));

    let err = store.mark_booked(trip_id, &labels(&["A1"]), first).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    store.mark_booked(trip_id, &labels(&["A1"]), second).await.unwrap();
}

#[tokio::test]
async fn test_booking_transition_is_compare_and_set() {
    let repo = MemoryBookingRepository::new();
    let booking = pending_booking(Uuid::new_v4(), &["A1"]);
    repo.create(&booking).await.unwrap();

    let pay = BookingTransition::new(&[BookingStatus::Pending], BookingStatus::Paid);
    let paid = repo.transition(booking.id, &pay).await.unwrap().unwrap();
    assert_eq!(paid.status, BookingStatus::Paid);
    assert!(paid.expires_at.is_none());

    // The second attempt sees Paid and loses
    assert!(repo.transition(booking.id, &pay).await.unwrap().is_none());
    assert!(repo.transition(Uuid::new_v4(), &pay).await.unwrap().is_none());

    let err = repo.create(&booking).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
}

#[tokio::test]
async fn test_expired_listing_skips_live_and_closed_bookings() {
    let repo = MemoryBookingRepository::new();
    let trip_id = Uuid::new_v4();

    let mut overdue = pending_booking(trip_id, &["A1"]);
    overdue.expires_at = Some(Utc::now() - Duration::minutes(1));
    let live = pending_booking(trip_id, &["A2"]);
    let mut cancelled = pending_booking(trip_id, &["B1"]);
    cancelled.expires_at = Some(Utc::now() - Duration::minutes(1));
    cancelled.status = BookingStatus::Cancelled;

    for booking in [&overdue, &live, &cancelled] {
        repo.create(booking).await.unwrap();
    }

    let expired = repo.list_expired(Utc::now(), 10).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, overdue.id);
}

#[tokio::test]
async fn test_ticket_batch_skips_existing_seats() {
    let repo = MemoryTicketRepository::new();
    let booking = pending_booking(Uuid::new_v4(), &["A1", "A2"]);
    let first: Vec<Ticket> = booking.seats.iter().map(|s| Ticket::issue(&booking, s)).collect();

    assert_eq!(repo.create_batch(&first).await.unwrap(), 2);
    let again: Vec<Ticket> = booking.seats.iter().map(|s| Ticket::issue(&booking, s)).collect();
    assert_eq!(repo.create_batch(&again).await.unwrap(), 0);
    assert_eq!(repo.list_by_booking(booking.id).await.unwrap().len(), 2);

    let code = first[0].ticket_code.clone();
    repo.check_in(&code, Utc::now()).await.unwrap();
    let err = repo.check_in(&code, Utc::now()).await.unwrap_err();
    assert!(matches!(err, CoreError::Conflict(_)));
    assert!(matches!(repo.check_in("TK-missing", Utc::now()).await, Err(CoreError::NotFound(_))));
}
