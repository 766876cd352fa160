#![allow(dead_code)]

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use seatline_booking::{
    BookingOrchestrator, BookingRules, GatewayRegistry, NewBooking, PaymentReconciler, PaymentUrls, Repositories,
};
use seatline_core::booking::{Booking, ContactInfo};
use seatline_core::gateway::PaymentGateway;
use seatline_core::repository::{BookingRepository, SeatStore};
use seatline_core::trip::{Trip, TripStatus};
use seatline_core::Holder;
use seatline_store::app_config::{MomoConfig, PayOsConfig, PaymentsConfig, ZaloPayConfig};
use seatline_store::memory::{
    MemoryBookingRepository, MemoryCache, MemoryPaymentRepository, MemorySeatStore, MemoryTicketRepository,
    MemoryTripRepository,
};

pub const SEAT_PRICE: i64 = 150_000;
pub const MOMO_SECRET: &str = "momo-secret";
pub const ZALOPAY_KEY2: &str = "zalopay-key2";
pub const PAYOS_CHECKSUM: &str = "payos-checksum";

pub struct Harness {
    pub cache: Arc<MemoryCache>,
    pub seats: Arc<MemorySeatStore>,
    pub bookings: Arc<MemoryBookingRepository>,
    pub payments: Arc<MemoryPaymentRepository>,
    pub tickets: Arc<MemoryTicketRepository>,
    pub trips: Arc<MemoryTripRepository>,
    pub orchestrator: Arc<BookingOrchestrator>,
    pub trip_id: Uuid,
}

pub fn seats(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|s| s.to_string()).collect()
}

pub fn trip(status: TripStatus) -> Trip {
    let departure = Utc::now() + Duration::days(1);
    Trip {
        id: Uuid::new_v4(),
        route_id: Uuid::new_v4(),
        bus_id: Uuid::new_v4(),
        departure_time: departure,
        arrival_time: departure + Duration::hours(6),
        price: SEAT_PRICE,
        status,
    }
}

pub fn payments_config() -> PaymentsConfig {
    PaymentsConfig {
        currency: "VND".to_string(),
        return_url_base: "http://localhost:3000".to_string(),
        webhook_url_base: "http://localhost:8080".to_string(),
        momo: Some(MomoConfig {
            partner_code: "MOMOTEST".to_string(),
            access_key: "momo-access".to_string(),
            secret_key: MOMO_SECRET.to_string(),
            sandbox: true,
        }),
        zalopay: Some(ZaloPayConfig {
            app_id: "2553".to_string(),
            key1: "zalopay-key1".to_string(),
            key2: ZALOPAY_KEY2.to_string(),
            sandbox: true,
        }),
        payos: Some(PayOsConfig {
            client_id: "payos-client".to_string(),
            api_key: "payos-api".to_string(),
            checksum_key: PAYOS_CHECKSUM.to_string(),
            sandbox: true,
        }),
    }
}

/// Knobs for the memory-backed stack. Everything left unset uses the in-memory default.
#[derive(Default)]
pub struct HarnessOptions {
    pub rules: BookingRules,
    pub seat_store: Option<Arc<dyn SeatStore>>,
    /// Wraps the booking repository the orchestrator talks to; `Harness::bookings`
    /// stays the inner memory repository.
    pub wrap_bookings: Option<fn(Arc<MemoryBookingRepository>) -> Arc<dyn BookingRepository>>,
}

/// Memory-backed stack with one scheduled trip holding seats A1..A4.
pub async fn harness() -> Harness {
    harness_with(HarnessOptions::default()).await
}

pub async fn harness_with_seat_store(seat_store: Option<Arc<dyn SeatStore>>) -> Harness {
    harness_with(HarnessOptions { seat_store, ..HarnessOptions::default() }).await
}

pub async fn harness_with_rules(rules: BookingRules) -> Harness {
    harness_with(HarnessOptions { rules, ..HarnessOptions::default() }).await
}

pub async fn harness_with(options: HarnessOptions) -> Harness {
    let cache = Arc::new(MemoryCache::new());
    let seats = Arc::new(MemorySeatStore::new());
    let bookings = Arc::new(MemoryBookingRepository::new());
    let payments = Arc::new(MemoryPaymentRepository::new());
    let tickets = Arc::new(MemoryTicketRepository::new());
    let trips = Arc::new(MemoryTripRepository::new());

    let trip = trip(TripStatus::Scheduled);
    let trip_id = trip.id;
    trips.insert(trip).await;
    seats
        .initialize_seats(trip_id, &self::seats(&["A1", "A2", "A3", "A4"]))
        .await
        .unwrap();

    let repos = Repositories {
        trips: trips.clone(),
        seats: options.seat_store.unwrap_or_else(|| seats.clone() as Arc<dyn SeatStore>),
        bookings: match options.wrap_bookings {
            Some(wrap) => wrap(bookings.clone()),
            None => bookings.clone() as Arc<dyn BookingRepository>,
        },
        payments: payments.clone(),
        tickets: tickets.clone(),
    };
    let orchestrator = Arc::new(BookingOrchestrator::new(repos, cache.clone(), options.rules));

    Harness {
        cache,
        seats,
        bookings,
        payments,
        tickets,
        trips,
        orchestrator,
        trip_id,
    }
}

impl Harness {
    pub fn registry(&self) -> Arc<GatewayRegistry> {
        Arc::new(GatewayRegistry::from_config(&payments_config()))
    }

    pub fn reconciler(&self) -> PaymentReconciler {
        self.reconciler_with(self.registry())
    }

    pub fn reconciler_with(&self, registry: Arc<GatewayRegistry>) -> PaymentReconciler {
        PaymentReconciler::new(
            self.payments.clone(),
            registry,
            self.orchestrator.clone(),
            PaymentUrls {
                return_url_base: "http://localhost:3000".to_string(),
                webhook_url_base: "http://localhost:8080".to_string(),
            },
        )
    }

    pub async fn book(&self, labels: &[&str], holder: &Holder) -> Booking {
        self.orchestrator
            .initiate_booking(NewBooking {
                trip_id: self.trip_id,
                seat_numbers: seats(labels),
                holder: holder.clone(),
                contact: ContactInfo {
                    name: Some("Nguyen Van A".to_string()),
                    email: Some("a@example.com".to_string()),
                    phone: Some("0900000000".to_string()),
                },
            })
            .await
            .unwrap()
    }
}

/// Registry with a single gateway, for adapters that misbehave on purpose.
pub fn registry_with(gateway: Arc<dyn PaymentGateway>) -> Arc<GatewayRegistry> {
    Arc::new(GatewayRegistry::builder().register(gateway).build())
}
