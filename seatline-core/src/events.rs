use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::seat::SeatStatus;

/// Published on `trip:{trip}:seats` whenever a seat changes state.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SeatUpdateEvent {
    pub trip_id: Uuid,
    pub seat_number: String,
    pub status: SeatStatus,
    pub changed_at: i64,
}

impl SeatUpdateEvent {
    pub fn new(trip_id: Uuid, seat_number: impl Into<String>, status: SeatStatus) -> Self {
        Self {
            trip_id,
            seat_number: seat_number.into(),
            status,
            changed_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Frames pushed to live seat-map viewers.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewerMessage {
    SeatUpdate {
        trip_id: Uuid,
        seat_number: String,
        status: SeatStatus,
    },
}

impl From<SeatUpdateEvent> for ViewerMessage {
    fn from(event: SeatUpdateEvent) -> Self {
        ViewerMessage::SeatUpdate {
            trip_id: event.trip_id,
            seat_number: event.seat_number,
            status: event.status,
        }
    }
}
