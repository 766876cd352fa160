use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::time::Duration;
use uuid::Uuid;

use crate::CoreResult;

pub fn seat_lock_key(trip_id: Uuid, seat_number: &str) -> String {
    format!("seat:lock:{}:{}", trip_id, seat_number)
}

pub fn trip_seats_key(trip_id: Uuid) -> String {
    format!("trip:seats:{}", trip_id)
}

pub fn trip_channel(trip_id: Uuid) -> String {
    format!("trip:{}:seats", trip_id)
}

/// Fast shared cache: first-tier seat locks, the seat snapshot and seat-update pub/sub.
#[async_trait]
pub trait LockCache: Send + Sync {
    /// Atomic set-if-absent with expiry. `true` when this call created the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CoreResult<bool>;

    async fn get(&self, key: &str) -> CoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CoreResult<()>;

    async fn delete(&self, key: &str) -> CoreResult<()>;

    /// Deletes `key` only while it still holds `owner`. `true` when a key was removed.
    async fn release(&self, key: &str, owner: &str) -> CoreResult<bool>;

    async fn publish(&self, channel: &str, payload: &str) -> CoreResult<()>;

    /// The stream is live once this returns and ends when the subscription drops.
    async fn subscribe(&self, channel: &str) -> CoreResult<BoxStream<'static, String>>;
}

/// Fixed-window request counter.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check_rate_limit(&self, key: &str, limit: i64, window: Duration) -> CoreResult<bool>;
}
