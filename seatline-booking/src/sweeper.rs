use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use seatline_core::CoreResult;

use crate::lock_manager::SeatLockManager;
use crate::orchestrator::{BookingOrchestrator, ExpiryReport};

/// Periodic cleanup: overdue Pending bookings, then stale seat locks.
pub struct ExpirySweeper {
    orchestrator: Arc<BookingOrchestrator>,
    locks: Arc<SeatLockManager>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(orchestrator: Arc<BookingOrchestrator>, interval: Duration) -> Self {
        let locks = orchestrator.lock_manager();
        Self {
            orchestrator,
            locks,
            interval,
        }
    }

    /// One pass. The lock sweep runs even when booking expiry failed.
    pub async fn tick(&self) -> CoreResult<(ExpiryReport, u64)> {
        let report = self.orchestrator.expire_old_bookings().await;
        let swept = self.locks.sweep_expired_locks().await;
        Ok((report?, swept?))
    }

    /// Runs until `shutdown` is cancelled. Errors are logged and the loop carries on.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Expiry sweeper started, interval {:?}", self.interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Expiry sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("Expiry sweep failed: {}", e);
                    }
                }
            }
        }
    }
}
