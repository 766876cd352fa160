use std::sync::Arc;

use seatline_core::repository::{
    BookingRepository, PaymentRepository, SeatStore, TicketRepository, TripRepository,
};

pub mod lock_manager;
pub mod notifier;
pub mod orchestrator;
pub mod reconciler;
pub mod gateways;
pub mod broadcaster;
pub mod sweeper;

pub use lock_manager::SeatLockManager;
pub use orchestrator::{BookingOrchestrator, BookingRules, ConfirmedBooking, ExpiryReport, NewBooking};
pub use reconciler::{PaymentReconciler, PaymentSession, PaymentUrls};
pub use gateways::GatewayRegistry;
pub use broadcaster::{SeatBroadcaster, ViewerHandle};
pub use sweeper::ExpirySweeper;

/// Storage handles shared by the orchestrator and reconciler.
#[derive(Clone)]
pub struct Repositories {
    pub trips: Arc<dyn TripRepository>,
    pub seats: Arc<dyn SeatStore>,
    pub bookings: Arc<dyn BookingRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub tickets: Arc<dyn TicketRepository>,
}
