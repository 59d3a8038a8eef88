//! ==============================================================================
//! cache.rs - latest reading per room
//! ==============================================================================
//!
//! purpose:
//!     the shared state between the ingestor (writes) and every consumer
//!     (reads). replaces the old "global dict" with an explicit object:
//!
//! ```text
//!     - SharedCache: owned by the ingestor, the only handle that can write
//!     - CacheReader: cloneable read-only view handed to the api / history
//! ```
//!
//! invariants:
//!     - every known room is present from construction, starting empty
//!     - the room set never changes; writes for unknown rooms are refused
//!     - a write swaps the whole Arc<RoomReading>, so a reader gets either
//!       the old record or the new one, never a mix
//!
//! locking:
//!     one coarse tokio RwLock around the map. updates arrive every few
//!     seconds and only swap a pointer while the lock is held.
//!
//! ==============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::domain::{AirQuality, Fields, RoomId, RoomReading};

/// ingestor connection lifecycle, doubles as the liveness indicator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Subscribed,
    Receiving,
}

impl LinkState {
    /// true while the session is up and subscriptions are in place
    pub fn is_live(self) -> bool {
        matches!(self, LinkState::Subscribed | LinkState::Receiving)
    }
}

struct Entry {
    reading: Arc<RoomReading>,
    updated_at: Option<DateTime<Utc>>,
    updates: u64,
}

struct Inner {
    order: Vec<RoomId>,
    rooms: HashMap<RoomId, Entry>,
    last_update: Option<DateTime<Utc>>,
    link: LinkState,
}

/// one room as seen by a consumer
#[derive(Clone, Debug, Serialize)]
pub struct RoomSnapshot {
    pub room: RoomId,
    pub fields: Fields,
    pub airquality_status: Option<AirQuality>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updates: u64,
}

/// whole cache as seen by a consumer
#[derive(Clone, Debug, Serialize)]
pub struct CacheSnapshot {
    pub rooms: Vec<RoomSnapshot>,
    pub last_update: Option<DateTime<Utc>>,
    pub link: LinkState,
}

impl Entry {
    fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room: self.reading.room_id.clone(),
            fields: self.reading.fields.clone(),
            airquality_status: self.reading.air_quality(),
            updated_at: self.updated_at,
            updates: self.updates,
        }
    }
}

// ==============================================================================
// writer handle
// ==============================================================================

pub struct SharedCache {
    inner: Arc<RwLock<Inner>>,
}

impl SharedCache {
    /// pre-populate every room with an empty reading
    pub fn new(rooms: &[RoomId]) -> Self {
        let mut order = Vec::with_capacity(rooms.len());
        let mut map = HashMap::with_capacity(rooms.len());
        for room in rooms {
            if map.contains_key(room) {
                continue;
            }
            order.push(room.clone());
            map.insert(
                room.clone(),
                Entry {
                    reading: Arc::new(RoomReading::empty(room.clone())),
                    updated_at: None,
                    updates: 0,
                },
            );
        }

        Self {
            inner: Arc::new(RwLock::new(Inner {
                order,
                rooms: map,
                last_update: None,
                link: LinkState::Disconnected,
            })),
        }
    }

    pub fn reader(&self) -> CacheReader {
        CacheReader {
            inner: self.inner.clone(),
        }
    }

    /// whole-record replace. returns false (and changes nothing) if the
    /// reading's room is not part of the known set.
    pub async fn replace(&self, reading: RoomReading) -> bool {
        let now = Utc::now();
        let reading = Arc::new(reading);

        let mut guard = self.inner.write().await;
        let Some(entry) = guard.rooms.get_mut(&reading.room_id) else {
            return false;
        };
        entry.reading = reading;
        entry.updated_at = Some(now);
        entry.updates += 1;
        guard.last_update = Some(now);
        true
    }

    pub async fn set_link_state(&self, link: LinkState) {
        self.inner.write().await.link = link;
    }
}

// ==============================================================================
// read-only view
// ==============================================================================

#[derive(Clone)]
pub struct CacheReader {
    inner: Arc<RwLock<Inner>>,
}

impl CacheReader {
    /// latest reading for a known room (empty until the first message);
    /// `None` only for rooms outside the configured set
    pub async fn get_reading(&self, room: &str) -> Option<Arc<RoomReading>> {
        self.inner
            .read()
            .await
            .rooms
            .get(room)
            .map(|e| e.reading.clone())
    }

    pub async fn room(&self, room: &str) -> Option<RoomSnapshot> {
        self.inner.read().await.rooms.get(room).map(Entry::snapshot)
    }

    pub async fn snapshot(&self) -> CacheSnapshot {
        let guard = self.inner.read().await;
        CacheSnapshot {
            rooms: guard
                .order
                .iter()
                .filter_map(|r| guard.rooms.get(r))
                .map(Entry::snapshot)
                .collect(),
            last_update: guard.last_update,
            link: guard.link,
        }
    }

    /// every room's current reading, in configuration order
    pub async fn readings(&self) -> Vec<Arc<RoomReading>> {
        let guard = self.inner.read().await;
        guard
            .order
            .iter()
            .filter_map(|r| guard.rooms.get(r))
            .map(|e| e.reading.clone())
            .collect()
    }

    pub async fn link_state(&self) -> LinkState {
        self.inner.read().await.link
    }

    pub async fn last_update(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.last_update
    }
}
