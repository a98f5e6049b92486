//! Room registry: finds or creates the room for a room id.
//!
//! Rooms are created lazily on first join and remove themselves when their
//! last member leaves. The registry is an ordinary value owned by the
//! server, shared through an `Arc`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use puzzlesync_protocol::RoomId;
use tokio::sync::Mutex;

use crate::room::spawn_room;
use crate::{PuzzleLogic, RoomHandle};

/// Counter for room instance numbers. A room id reused after eviction gets
/// a new instance number, so a stale removal can never hit the new room.
static NEXT_ROOM_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// All live rooms, keyed by room id.
pub struct RoomRegistry<P: PuzzleLogic> {
    rooms: Mutex<HashMap<RoomId, RoomHandle<P>>>,
}

impl<P: PuzzleLogic> RoomRegistry<P> {
    /// Creates an empty registry.
    ///
    /// Returned in an `Arc` because each room keeps a weak reference back
    /// to it for self-eviction.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rooms: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the live room for `room_id`, spawning one if there is none.
    ///
    /// Lookup and creation happen under one lock acquisition, so two
    /// concurrent callers for the same id always get the same room. An
    /// entry whose actor has already stopped is replaced.
    pub async fn get_or_create(self: &Arc<Self>, room_id: &RoomId) -> RoomHandle<P> {
        let mut rooms = self.rooms.lock().await;

        if let Some(handle) = rooms.get(room_id) {
            if !handle.is_closed() {
                return handle.clone();
            }
        }

        let instance = NEXT_ROOM_INSTANCE.fetch_add(1, Ordering::Relaxed);
        let handle = spawn_room::<P>(
            room_id.clone(),
            instance,
            &P::room_config(),
            Arc::downgrade(self),
        );
        rooms.insert(room_id.clone(), handle.clone());
        tracing::info!(%room_id, instance, "room created");
        handle
    }

    /// Returns the live room for `room_id`, if any.
    pub async fn get(&self, room_id: &RoomId) -> Option<RoomHandle<P>> {
        self.rooms
            .lock()
            .await
            .get(room_id)
            .filter(|h| !h.is_closed())
            .cloned()
    }

    /// Removes `handle`'s room, but only if the registry still maps its id
    /// to that same instance. Returns `true` if an entry was removed.
    pub async fn remove(&self, handle: &RoomHandle<P>) -> bool {
        self.remove_instance(handle.room_id(), handle.instance()).await
    }

    pub(crate) async fn remove_instance(&self, room_id: &RoomId, instance: u64) -> bool {
        let mut rooms = self.rooms.lock().await;
        match rooms.get(room_id) {
            Some(current) if current.instance() == instance => {
                rooms.remove(room_id);
                tracing::debug!(%room_id, instance, "room removed from registry");
                true
            }
            _ => false,
        }
    }

    /// Number of registered rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Ids of registered rooms, in no particular order.
    pub async fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.lock().await.keys().cloned().collect()
    }
}

impl<P: PuzzleLogic> std::fmt::Debug for RoomRegistry<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomRegistry").finish_non_exhaustive()
    }
}
