use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    Available,
    Locked,
    Booked,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Available => "available",
            SeatStatus::Locked => "locked",
            SeatStatus::Booked => "booked",
        }
    }
}

impl FromStr for SeatStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(SeatStatus::Available),
            "locked" => Ok(SeatStatus::Locked),
            "booked" => Ok(SeatStatus::Booked),
            other => Err(CoreError::InternalError(format!("unknown seat status: {}", other))),
        }
    }
}

/// One physical seat on one trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Seat {
    pub trip_id: Uuid,
    pub seat_number: String,
    pub status: SeatStatus,
    pub locked_until: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub booking_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl Seat {
    pub fn available(trip_id: Uuid, seat_number: impl Into<String>) -> Self {
        Self {
            trip_id,
            seat_number: seat_number.into(),
            status: SeatStatus::Available,
            locked_until: None,
            locked_by: None,
            booking_id: None,
            updated_at: Utc::now(),
        }
    }

    /// A lock whose deadline has passed counts as released, swept or not.
    pub fn lock_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == SeatStatus::Locked && self.locked_until.map_or(true, |until| until <= now)
    }

    pub fn effective_status(&self, now: DateTime<Utc>) -> SeatStatus {
        if self.lock_expired(now) {
            SeatStatus::Available
        } else {
            self.status
        }
    }

    pub fn ensure_lockable(&self, now: DateTime<Utc>) -> CoreResult<()> {
        match self.effective_status(now) {
            SeatStatus::Available => Ok(()),
            SeatStatus::Booked => Err(CoreError::Conflict(format!(
                "seat {} is already booked",
                self.seat_number
            ))),
            SeatStatus::Locked => Err(CoreError::Conflict(format!(
                "seat {} is locked by another user",
                self.seat_number
            ))),
        }
    }

    /// A seat can be booked by `booking_id` when it is free or already owned by that
    /// booking, either as its live lock or as a booked row.
    pub fn ensure_bookable(&self, booking_id: Uuid, now: DateTime<Utc>) -> CoreResult<()> {
        match self.effective_status(now) {
            SeatStatus::Available => Ok(()),
            SeatStatus::Locked | SeatStatus::Booked if self.booking_id == Some(booking_id) => Ok(()),
            SeatStatus::Booked => Err(CoreError::Conflict(format!(
                "seat {} is booked by another booking",
                self.seat_number
            ))),
            SeatStatus::Locked => Err(CoreError::Conflict(format!(
                "seat {} is locked by another booking",
                self.seat_number
            ))),
        }
    }

    pub fn view(&self, now: DateTime<Utc>) -> SeatView {
        let status = self.effective_status(now);
        SeatView {
            seat_number: self.seat_number.clone(),
            status,
            locked_until: if status == SeatStatus::Locked { self.locked_until } else { None },
        }
    }
}

/// Client-facing seat map entry with lazy expiry already applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeatView {
    pub seat_number: String,
    pub status: SeatStatus,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Trims labels and rejects empty requests, blank labels and duplicates.
pub fn normalize_seat_numbers(seat_numbers: &[String]) -> CoreResult<Vec<String>> {
    if seat_numbers.is_empty() {
        return Err(CoreError::ValidationError("at least one seat is required".to_string()));
    }

    let mut seen = HashSet::new();
    let mut normalized = Vec::with_capacity(seat_numbers.len());
    for raw in seat_numbers {
        let seat = raw.trim();
        if seat.is_empty() {
            return Err(CoreError::ValidationError("seat number cannot be blank".to_string()));
        }
        if !seen.insert(seat.to_string()) {
            return Err(CoreError::ValidationError(format!("seat {} requested twice", seat)));
        }
        normalized.push(seat.to_string());
    }
    Ok(normalized)
}

fn ensure_all_present(rows: &[Seat], requested: &[String]) -> CoreResult<()> {
    if rows.len() == requested.len() {
        return Ok(());
    }
    let found: HashSet<&str> = rows.iter().map(|s| s.seat_number.as_str()).collect();
    let missing: Vec<&str> = requested
        .iter()
        .map(String::as_str)
        .filter(|s| !found.contains(s))
        .collect();
    Err(CoreError::NotFound(format!("seats not found: {}", missing.join(", "))))
}

/// Check run under the store's row locks before a batch lock is written.
pub fn ensure_all_lockable(rows: &[Seat], requested: &[String], now: DateTime<Utc>) -> CoreResult<()> {
    ensure_all_present(rows, requested)?;
    rows.iter().try_for_each(|seat| seat.ensure_lockable(now))
}

pub fn ensure_all_bookable(rows: &[Seat], requested: &[String], booking_id: Uuid, now: DateTime<Utc>) -> CoreResult<()> {
    ensure_all_present(rows, requested)?;
    rows.iter().try_for_each(|seat| seat.ensure_bookable(booking_id, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn locked(seat: &str, by: &str, until: DateTime<Utc>) -> Seat {
        Seat {
            status: SeatStatus::Locked,
            locked_until: Some(until),
            locked_by: Some(by.to_string()),
            booking_id: Some(Uuid::new_v4()),
            ..Seat::available(Uuid::nil(), seat)
        }
    }

    #[test]
    fn test_expired_lock_is_available() {
        let now = Utc::now();
        let seat = locked("A1", "user:1", now - Duration::seconds(1));
        assert_eq!(seat.effective_status(now), SeatStatus::Available);
        assert!(seat.ensure_lockable(now).is_ok());
    }

    #[test]
    fn test_live_lock_conflicts() {
        let now = Utc::now();
        let seat = locked("A1", "user:1", now + Duration::minutes(10));
        assert!(matches!(seat.ensure_lockable(now), Err(CoreError::Conflict(_))));
    }

    #[test]
    fn test_booked_seat_conflicts() {
        let seat = Seat {
            status: SeatStatus::Booked,
            booking_id: Some(Uuid::new_v4()),
            ..Seat::available(Uuid::nil(), "B2")
        };
        assert!(matches!(seat.ensure_lockable(Utc::now()), Err(CoreError::Conflict(_))));
    }

    #[test]
    fn test_missing_rows_are_not_found() {
        let rows = vec![Seat::available(Uuid::nil(), "A1")];
        let requested = vec!["A1".to_string(), "Z9".to_string()];
        match ensure_all_lockable(&rows, &requested, Utc::now()) {
            Err(CoreError::NotFound(msg)) => assert!(msg.contains("Z9")),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_bookable_by_owning_booking_only() {
        let now = Utc::now();
        let seat = locked("A1", "session:abc", now + Duration::minutes(5));
        let owner = seat.booking_id.unwrap();

        assert!(seat.ensure_bookable(owner, now).is_ok());
        // Same holder, different booking
        assert!(matches!(seat.ensure_bookable(Uuid::new_v4(), now), Err(CoreError::Conflict(_))));

        let booked = Seat {
            status: SeatStatus::Booked,
            booking_id: Some(owner),
            ..Seat::available(Uuid::nil(), "A1")
        };
        assert!(booked.ensure_bookable(owner, now).is_ok());
        assert!(booked.ensure_bookable(Uuid::new_v4(), now).is_err());

        // A lapsed lock no longer belongs to anyone
        let lapsed = locked("A2", "session:abc", now - Duration::seconds(1));
        assert!(lapsed.ensure_bookable(Uuid::new_v4(), now).is_ok());
    }

    #[test]
    fn test_normalize_seat_numbers() {
        let ok = normalize_seat_numbers(&[" A1".to_string(), "A2 ".to_string()]).unwrap();
        assert_eq!(ok, vec!["A1", "A2"]);

        assert!(normalize_seat_numbers(&[]).is_err());
        assert!(normalize_seat_numbers(&["A1".to_string(), "A1".to_string()]).is_err());
        assert!(normalize_seat_numbers(&["  ".to_string()]).is_err());
    }
}
