use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use seatline_core::cache::{trip_channel, trip_seats_key, LockCache};
use seatline_core::events::SeatUpdateEvent;
use seatline_core::seat::SeatStatus;

/// Drops the cached seat snapshot and publishes one update per seat.
///
/// Both steps are best effort: the store already holds the new state.
#[derive(Clone)]
pub struct SeatNotifier {
    cache: Arc<dyn LockCache>,
}

impl SeatNotifier {
    pub fn new(cache: Arc<dyn LockCache>) -> Self {
        Self { cache }
    }

    pub async fn invalidate(&self, trip_id: Uuid) {
        if let Err(e) = self.cache.delete(&trip_seats_key(trip_id)).await {
            warn!("Failed to invalidate seat snapshot for trip {}: {}", trip_id, e);
        }
    }

    pub async fn seats_changed(&self, trip_id: Uuid, seat_numbers: &[String], status: SeatStatus) {
        self.invalidate(trip_id).await;

        let channel = trip_channel(trip_id);
        for seat in seat_numbers {
            let event = SeatUpdateEvent::new(trip_id, seat.clone(), status);
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Failed to encode seat update: {}", e);
                    continue;
                }
            };
            if let Err(e) = self.cache.publish(&channel, &payload).await {
                warn!("Failed to publish seat update on {}: {}", channel, e);
            }
        }
    }
}
