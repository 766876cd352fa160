use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use seatline_booking::ViewerHandle;

use crate::error::AppError;
use crate::state::AppState;

/// GET /v1/trips/{id}/live
///
/// Streams `seat_update` frames for one trip until either side goes away.
/// The trip must exist; the room is joined before the upgrade so a
/// subscription failure is reported as a normal HTTP error.
pub async fn live_seats(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
    upgrade: WebSocketUpgrade,
) -> Result<Response, AppError> {
    // 1. Reject unknown trips up front
    state.orchestrator.seat_map(trip_id).await?;

    // 2. Join the trip room
    let viewer = state.broadcaster.join(trip_id).await?;

    Ok(upgrade.on_upgrade(move |socket| stream_seats(socket, viewer)))
}

async fn stream_seats(socket: WebSocket, mut viewer: ViewerHandle) {
    let trip_id = viewer.trip_id();
    let (mut sender, mut receiver) = socket.split();
    info!("Viewer connected to trip {}", trip_id);

    loop {
        tokio::select! {
            frame = viewer.recv() => {
                let Some(frame) = frame else {
                    debug!("Room for trip {} closed", trip_id);
                    break;
                };
                if sender.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(_)) => debug!("Ignoring client frame on trip {}", trip_id),
                    Some(Err(e)) => {
                        warn!("WebSocket error on trip {}: {}", trip_id, e);
                        break;
                    }
                }
            }
        }
    }

    let _ = sender.close().await;
    info!("Viewer left trip {}", trip_id);
}
