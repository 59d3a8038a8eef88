//! ==============================================================================
//! simulator.rs - synthetic room readings publisher
//! ==============================================================================
//!
//! purpose:
//!     stands in for real sensors. every cycle it publishes exactly one
//!     reading per known room to that room's channel, encoded the same way
//!     the ingestor decodes it.
//!
//! value ranges:
//!     temp 20..=30, humidity 30..=70, pressure 980..=1050 (integers, sent
//!     as strings), airquality one of good / moderate / poor.
//!
//! ==============================================================================

use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::domain::{encode_fields, Fields, AIR_QUALITY, HUMIDITY, PRESSURE, TEMP};
use crate::error::{HubError, Result};
use crate::topics::TopicMap;
use crate::transport::Outbox;

const AIR_QUALITY_LEVELS: [&str; 3] = ["good", "moderate", "poor"];

/// one random reading in the reference ranges
pub fn generate_fields<R: Rng + ?Sized>(rng: &mut R) -> Fields {
    let mut fields = Fields::new();
    fields.insert(TEMP.to_string(), rng.random_range(20..=30).to_string());
    fields.insert(HUMIDITY.to_string(), rng.random_range(30..=70).to_string());
    fields.insert(PRESSURE.to_string(), rng.random_range(980..=1050).to_string());
    let air = AIR_QUALITY_LEVELS[rng.random_range(0..AIR_QUALITY_LEVELS.len())];
    fields.insert(AIR_QUALITY.to_string(), air.to_string());
    fields
}

pub struct Simulator<O> {
    outbox: O,
    topics: TopicMap,
    interval: Duration,
    show_sensor_data: bool,
}

impl<O: Outbox> Simulator<O> {
    pub fn new(outbox: O, topics: TopicMap, interval: Duration) -> Self {
        Self {
            outbox,
            topics,
            interval,
            show_sensor_data: false,
        }
    }

    pub fn show_sensor_data(mut self, show: bool) -> Self {
        self.show_sensor_data = show;
        self
    }

    pub fn into_outbox(self) -> O {
        self.outbox
    }

    /// publish one reading per room. a failed publish is logged and the
    /// cycle moves on; returns how many rooms were published.
    pub async fn publish_cycle(&self) -> usize {
        let mut published = 0;
        for room in self.topics.rooms() {
            // ThreadRng is !Send, keep it out of the await
            let fields = generate_fields(&mut rand::rng());
            let topic = self.topics.topic_for(room);

            match self.publish(&topic, &fields).await {
                Ok(()) => {
                    published += 1;
                    if self.show_sensor_data {
                        info!(room = %room, fields = ?fields, "[SIM] Published");
                    }
                }
                Err(e) => warn!(room = %room, error = %e, "[SIM] Publish failed"),
            }
        }
        published
    }

    async fn publish(&self, topic: &str, fields: &Fields) -> Result<()> {
        let payload = encode_fields(fields).map_err(|e| HubError::Publish {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;
        self.outbox.publish(topic, payload).await
    }

    /// publish a cycle every interval until shutdown
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            rooms = self.topics.rooms().len(),
            interval_s = self.interval.as_secs(),
            "[SIM] Publishing"
        );
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.publish_cycle().await;
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("[SIM] Simulator stopped");
    }
}
