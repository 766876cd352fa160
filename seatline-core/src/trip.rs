use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Scheduled,
    Boarding,
    InTransit,
    Completed,
    Cancelled,
    Delayed,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Scheduled => "scheduled",
            TripStatus::Boarding => "boarding",
            TripStatus::InTransit => "in_transit",
            TripStatus::Completed => "completed",
            TripStatus::Cancelled => "cancelled",
            TripStatus::Delayed => "delayed",
        }
    }

    pub fn is_bookable(&self) -> bool {
        *self == TripStatus::Scheduled
    }
}

impl FromStr for TripStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(TripStatus::Scheduled),
            "boarding" => Ok(TripStatus::Boarding),
            "in_transit" => Ok(TripStatus::InTransit),
            "completed" => Ok(TripStatus::Completed),
            "cancelled" => Ok(TripStatus::Cancelled),
            "delayed" => Ok(TripStatus::Delayed),
            other => Err(CoreError::InternalError(format!("unknown trip status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub id: Uuid,
    pub route_id: Uuid,
    pub bus_id: Uuid,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    /// Price per seat, in the smallest currency unit.
    pub price: i64,
    pub status: TripStatus,
}

/// Physical seat grid of a bus. Cells labelled `aisle`, `empty` or left blank are not seats.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeatLayout {
    pub rows: usize,
    pub columns: usize,
    #[serde(default = "default_floors")]
    pub floors: usize,
    pub layout: Vec<Vec<String>>,
}

fn default_floors() -> usize { 1 }

impl SeatLayout {
    pub fn seat_numbers(&self) -> Vec<String> {
        self.layout
            .iter()
            .flatten()
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty() && !matches!(*cell, "aisle" | "empty"))
            .map(str::to_string)
            .collect()
    }
}
