//! ==============================================================================
//! history.rs - rolling temperature / humidity samples per room
//! ==============================================================================
//!
//! purpose:
//!     the data behind the dashboard's trend charts. a poller samples the
//!     cache on a fixed interval and keeps the newest `max_points` numeric
//!     samples per room. a tick where a room's temp or humidity is missing
//!     or not a number adds nothing for that room.
//!
//! ```text
//!     lives beside the cache, not inside it: the ingestor never waits on it.
//! ```
//!
//! ==============================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, RwLock};

use crate::cache::CacheReader;
use crate::domain::{RoomId, RoomReading, HUMIDITY, TEMP};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Sample {
    pub at: DateTime<Utc>,
    pub temp: f64,
    pub humidity: f64,
}

#[derive(Clone)]
pub struct History {
    max_points: usize,
    rooms: Arc<RwLock<HashMap<RoomId, VecDeque<Sample>>>>,
}

impl History {
    pub fn new(max_points: usize) -> Self {
        Self {
            max_points: max_points.max(1),
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// record one sample per room whose values are numeric
    pub async fn record(&self, readings: &[Arc<RoomReading>], at: DateTime<Utc>) {
        let mut rooms = self.rooms.write().await;
        for reading in readings {
            let (Some(temp), Some(humidity)) = (reading.numeric(TEMP), reading.numeric(HUMIDITY))
            else {
                continue;
            };
            let series = rooms.entry(reading.room_id.clone()).or_default();
            series.push_back(Sample { at, temp, humidity });
            while series.len() > self.max_points {
                series.pop_front();
            }
        }
    }

    /// oldest first
    pub async fn samples(&self, room: &str) -> Vec<Sample> {
        self.rooms
            .read()
            .await
            .get(room)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// sample the cache every `every` until shutdown
    pub async fn run(&self, cache: CacheReader, every: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let readings = cache.readings().await;
                    self.record(&readings, Utc::now()).await;
                }
                _ = shutdown.changed() => break,
            }
        }
    }
}
