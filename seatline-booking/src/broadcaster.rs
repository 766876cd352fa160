use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use seatline_core::cache::{trip_channel, LockCache};
use seatline_core::events::{SeatUpdateEvent, ViewerMessage};
use seatline_core::CoreResult;

struct Room {
    generation: u64,
    viewers: HashMap<u64, mpsc::Sender<String>>,
    token: CancellationToken,
}

struct Inner {
    cache: Arc<dyn LockCache>,
    rooms: Mutex<HashMap<Uuid, Room>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Inner {
    fn rooms(&self) -> MutexGuard<'_, HashMap<Uuid, Room>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Delivers one update to the room of `generation`. A pump whose room was replaced
    /// delivers nothing.
    fn fan_out(&self, trip_id: Uuid, generation: u64, raw: &str) {
        let event: SeatUpdateEvent = match serde_json::from_str(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping undecodable seat update on trip {}: {}", trip_id, e);
                return;
            }
        };
        let frame = match serde_json::to_string(&ViewerMessage::from(event)) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode viewer frame: {}", e);
                return;
            }
        };

        let mut rooms = self.rooms();
        let Some(room) = rooms.get_mut(&trip_id).filter(|room| room.generation == generation) else {
            return;
        };

        room.viewers.retain(|viewer_id, tx| match tx.try_send(frame.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Viewer {} on trip {} is not keeping up, disconnecting", viewer_id, trip_id);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });

        if room.viewers.is_empty() {
            room.token.cancel();
            rooms.remove(&trip_id);
            debug!("Room for trip {} emptied during fan-out", trip_id);
        }
    }

    fn leave(&self, trip_id: Uuid, viewer_id: u64) {
        let mut rooms = self.rooms();
        let Some(room) = rooms.get_mut(&trip_id) else {
            return;
        };
        if room.viewers.remove(&viewer_id).is_some() && room.viewers.is_empty() {
            room.token.cancel();
            rooms.remove(&trip_id);
            info!("Last viewer left trip {}, closing room", trip_id);
        }
    }

    /// Drops the room and with it every viewer sender, unless it was already replaced.
    fn close_room(&self, trip_id: Uuid, generation: u64) {
        let mut rooms = self.rooms();
        if rooms.get(&trip_id).is_some_and(|room| room.generation == generation) {
            rooms.remove(&trip_id);
        }
    }
}

/// Live seat-map rooms, one per trip with at least one viewer.
///
/// A room owns a single cache subscription and a pump task that fans each
/// message out to bounded viewer queues. Slow viewers are dropped, never awaited.
#[derive(Clone)]
pub struct SeatBroadcaster {
    inner: Arc<Inner>,
}

impl SeatBroadcaster {
    pub fn new(cache: Arc<dyn LockCache>, buffer: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                rooms: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Adds a viewer to the trip's room, opening the room on first join.
    pub async fn join(&self, trip_id: Uuid) -> CoreResult<ViewerHandle> {
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        let viewer_id = self.inner.next_id();
        let handle = ViewerHandle {
            trip_id,
            viewer_id,
            rx,
            inner: self.inner.clone(),
        };

        // 1. Existing room
        {
            let mut rooms = self.inner.rooms();
            if let Some(room) = rooms.get_mut(&trip_id) {
                room.viewers.insert(viewer_id, tx);
                return Ok(handle);
            }
        }

        // 2. Subscribe outside the lock
        let stream = self.inner.cache.subscribe(&trip_channel(trip_id)).await?;

        // 3. Another join may have opened the room meanwhile; ours is then redundant
        let mut rooms = self.inner.rooms();
        if let Some(room) = rooms.get_mut(&trip_id) {
            room.viewers.insert(viewer_id, tx);
            return Ok(handle);
        }

        let generation = self.inner.next_id();
        let token = CancellationToken::new();
        rooms.insert(
            trip_id,
            Room {
                generation,
                viewers: HashMap::from([(viewer_id, tx)]),
                token: token.clone(),
            },
        );
        drop(rooms);

        tokio::spawn(pump(self.inner.clone(), trip_id, generation, stream, token));
        info!("Opened live seat room for trip {}", trip_id);
        Ok(handle)
    }

    pub fn viewer_count(&self, trip_id: Uuid) -> usize {
        self.inner.rooms().get(&trip_id).map_or(0, |room| room.viewers.len())
    }

    pub fn room_count(&self) -> usize {
        self.inner.rooms().len()
    }
}

async fn pump(
    inner: Arc<Inner>,
    trip_id: Uuid,
    generation: u64,
    mut stream: BoxStream<'static, String>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            _ = token.cancelled() => {
                debug!("Seat subscription for trip {} released", trip_id);
                break;
            }
            message = stream.next() => match message {
                Some(raw) => inner.fan_out(trip_id, generation, &raw),
                None => {
                    warn!("Seat update stream for trip {} ended, disconnecting viewers", trip_id);
                    inner.close_room(trip_id, generation);
                    break;
                }
            }
        }
    }
}

/// One viewer's queue. Dropping it leaves the room.
pub struct ViewerHandle {
    trip_id: Uuid,
    viewer_id: u64,
    rx: mpsc::Receiver<String>,
    inner: Arc<Inner>,
}

impl ViewerHandle {
    pub fn trip_id(&self) -> Uuid {
        self.trip_id
    }

    /// Next encoded `seat_update` frame. `None` once the viewer was dropped or the room closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

impl Drop for ViewerHandle {
    fn drop(&mut self) {
        self.inner.leave(self.trip_id, self.viewer_id);
    }
}
