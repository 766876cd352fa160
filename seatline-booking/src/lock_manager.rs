use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use seatline_core::cache::{seat_lock_key, LockCache};
use seatline_core::repository::SeatStore;
use seatline_core::seat::normalize_seat_numbers;
use seatline_core::{CoreError, CoreResult, Holder};

/// Two-tier seat locking: a cache admission filter in front of the durable seat store.
///
/// The cache rejects most contention in one round trip; the store's row locks
/// are the source of truth. Whatever the cache phase acquired is handed back if
/// the store phase fails.
pub struct SeatLockManager {
    cache: Arc<dyn LockCache>,
    seats: Arc<dyn SeatStore>,
}

impl SeatLockManager {
    pub fn new(cache: Arc<dyn LockCache>, seats: Arc<dyn SeatStore>) -> Self {
        Self { cache, seats }
    }

    /// Locks every requested seat for `holder` on behalf of `booking_id`, or none of them.
    /// Returns the lock deadline.
    pub async fn lock_seats(
        &self,
        trip_id: Uuid,
        seat_numbers: &[String],
        booking_id: Uuid,
        holder: &Holder,
        duration: Duration,
    ) -> CoreResult<DateTime<Utc>> {
        let seats = normalize_seat_numbers(seat_numbers)?;
        let owner = holder.lock_value();
        let ttl = chrono::Duration::from_std(duration)
            .map_err(|_| CoreError::ValidationError("lock duration out of range".to_string()))?;
        let locked_until = Utc::now() + ttl;

        // 1. Cache admission
        let acquired = self.acquire_cache_locks(trip_id, &seats, &owner, duration).await?;

        // 2. Durable lock, all rows in one transaction
        if let Err(e) = self.seats.lock_seats(trip_id, &seats, booking_id, &owner, locked_until).await {
            self.release_keys(&acquired, &owner).await;
            return Err(e);
        }

        info!("Locked seats {:?} on trip {} for {} until {}", seats, trip_id, owner, locked_until);
        Ok(locked_until)
    }

    async fn acquire_cache_locks(
        &self,
        trip_id: Uuid,
        seats: &[String],
        owner: &str,
        ttl: Duration,
    ) -> CoreResult<Vec<String>> {
        let mut acquired = Vec::with_capacity(seats.len());

        for seat in seats {
            let key = seat_lock_key(trip_id, seat);
            match self.cache.set_if_absent(&key, owner, ttl).await {
                Ok(true) => acquired.push(key),
                Ok(false) => {
                    self.release_keys(&acquired, owner).await;
                    return Err(CoreError::Conflict(format!("seat {} is locked by another user", seat)));
                }
                Err(e) => {
                    // The store alone still decides correctly, it just sees more contention.
                    warn!("Lock cache unavailable, falling back to store-only locking: {}", e);
                    self.release_keys(&acquired, owner).await;
                    return Ok(Vec::new());
                }
            }
        }

        Ok(acquired)
    }

    async fn release_keys(&self, keys: &[String], owner: &str) {
        for key in keys {
            if let Err(e) = self.cache.release(key, owner).await {
                warn!("Failed to release cache lock {}: {}", key, e);
            }
        }
    }

    /// Removes `holder`'s cache locks for the given seats. Store state is untouched.
    pub async fn release_cache_locks(&self, trip_id: Uuid, seat_numbers: &[String], holder: &Holder) {
        let keys: Vec<String> = seat_numbers.iter().map(|s| seat_lock_key(trip_id, s)).collect();
        self.release_keys(&keys, &holder.lock_value()).await;
    }

    /// Drops cache keys and returns Locked seats to Available. Booked seats are not affected.
    pub async fn unlock_seats(&self, trip_id: Uuid, seat_numbers: &[String]) -> CoreResult<u64> {
        for seat in seat_numbers {
            let key = seat_lock_key(trip_id, seat);
            if let Err(e) = self.cache.delete(&key).await {
                warn!("Failed to delete cache lock {}: {}", key, e);
            }
        }

        let unlocked = self.seats.unlock_seats(trip_id, seat_numbers).await?;
        info!("Unlocked {} seats on trip {}", unlocked, trip_id);
        Ok(unlocked)
    }

    /// Physically resets store locks whose deadline has passed.
    pub async fn sweep_expired_locks(&self) -> CoreResult<u64> {
        let swept = self.seats.sweep_expired_locks(Utc::now()).await?;
        if swept > 0 {
            info!("Released {} expired seat locks", swept);
        }
        Ok(swept)
    }
}
