use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use seatline_booking::{BookingOrchestrator, ExpirySweeper};

/// Spawns the expiry sweeper. It stops once `shutdown` is cancelled.
pub fn start_expiry_worker(
    orchestrator: Arc<BookingOrchestrator>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    info!("Expiry worker started, sweeping every {:?}", interval);
    let sweeper = ExpirySweeper::new(orchestrator, interval);
    tokio::spawn(sweeper.run(shutdown))
}
