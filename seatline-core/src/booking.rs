use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::holder::Holder;
use crate::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Paid,
    Confirmed,
    Expired,
    Cancelled,
    Refunded,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Paid => "paid",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Expired => "expired",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Refunded => "refunded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Expired | BookingStatus::Cancelled | BookingStatus::Refunded)
    }

    /// Allowed lifecycle edges.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Paid)
                | (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Pending, Expired)
                | (Paid, Confirmed)
                | (Paid, Cancelled)
                | (Paid, Refunded)
                | (Confirmed, Cancelled)
                | (Confirmed, Refunded)
        )
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "paid" => Ok(BookingStatus::Paid),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "expired" => Ok(BookingStatus::Expired),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "refunded" => Ok(BookingStatus::Refunded),
            other => Err(CoreError::InternalError(format!("unknown booking status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContactInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub user_id: Option<Uuid>,
    pub holder: Holder,
    pub seats: Vec<String>,
    pub total_price: i64,
    pub currency: String,
    pub status: BookingStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub booking_code: String,
    pub contact: ContactInfo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn new_pending(
        trip_id: Uuid,
        holder: Holder,
        seats: Vec<String>,
        unit_price: i64,
        currency: impl Into<String>,
        contact: ContactInfo,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        let total_price = unit_price * seats.len() as i64;
        Self {
            id: Uuid::new_v4(),
            trip_id,
            user_id: holder.user_id(),
            holder,
            seats,
            total_price,
            currency: currency.into(),
            status: BookingStatus::Pending,
            expires_at: Some(expires_at),
            booking_code: generate_booking_code(now),
            contact,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Pending && self.expires_at.is_some_and(|at| at < now)
    }
}

/// Human-readable booking reference: `BK{unix}{8 hex}`.
pub fn generate_booking_code(at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("BK{}{}", at.timestamp(), suffix)
}

/// Guarded state change applied by `BookingRepository::transition`.
#[derive(Debug, Clone)]
pub struct BookingTransition {
    pub from: Vec<BookingStatus>,
    pub to: BookingStatus,
    pub at: DateTime<Utc>,
}

impl BookingTransition {
    pub fn new(from: &[BookingStatus], to: BookingStatus) -> Self {
        Self { from: from.to_vec(), to, at: Utc::now() }
    }

    /// Applies the transition to an in-memory booking if its status matches.
    pub fn apply(&self, booking: &mut Booking) -> bool {
        if !self.from.contains(&booking.status) {
            return false;
        }
        booking.status = self.to;
        booking.updated_at = self.at;
        if self.to != BookingStatus::Pending {
            booking.expires_at = None;
        }
        if matches!(self.to, BookingStatus::Cancelled | BookingStatus::Expired) {
            booking.cancelled_at = Some(self.at);
        }
        true
    }
}
