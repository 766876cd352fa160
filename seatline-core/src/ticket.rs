use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::booking::Booking;
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub trip_id: Uuid,
    pub seat_number: String,
    pub ticket_code: String,
    pub passenger_name: Option<String>,
    pub passenger_email: Option<String>,
    pub passenger_phone: Option<String>,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    pub fn issue(booking: &Booking, seat_number: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            booking_id: booking.id,
            trip_id: booking.trip_id,
            seat_number: seat_number.to_string(),
            ticket_code: generate_ticket_code(now),
            passenger_name: booking.contact.name.clone(),
            passenger_email: booking.contact.email.clone(),
            passenger_phone: booking.contact.phone.clone(),
            checked_in_at: None,
            created_at: now,
        }
    }

    pub fn check_in(&mut self, at: DateTime<Utc>) -> CoreResult<()> {
        if let Some(previous) = self.checked_in_at {
            return Err(CoreError::Conflict(format!(
                "ticket {} already checked in at {}",
                self.ticket_code, previous
            )));
        }
        self.checked_in_at = Some(at);
        Ok(())
    }
}

/// Ticket codes follow `TK-{timestamp}-{short id}`.
pub fn generate_ticket_code(at: DateTime<Utc>) -> String {
    let short = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("TK-{}-{}", at.timestamp(), short)
}
