use std::sync::Arc;

use seatline_booking::{BookingOrchestrator, PaymentReconciler, SeatBroadcaster};
use seatline_core::cache::RateLimiter;
use seatline_store::app_config::BusinessRules;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BookingOrchestrator>,
    pub reconciler: Arc<PaymentReconciler>,
    pub broadcaster: SeatBroadcaster,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}
