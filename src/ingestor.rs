//! ==============================================================================
//! ingestor.rs - broker subscription -> shared cache
//! ==============================================================================
//!
//! purpose:
//!     the only writer of the SharedCache. holds the room/topic map, decodes
//!     every inbound message and swaps the room's record.
//!
//! lifecycle:
//!
//! ```text
//!     Disconnected ──> Connecting ──> Subscribed ──> Receiving
//!          ^               ^                             │
//!          │ (backoff)     └──── transport lost ─────────┘
//!          └── connect failed          (backoff)
//! ```
//!
//! ```text
//!     both retry paths wait out the next backoff delay. the backoff only
//!     resets after a session that delivered at least one message.
//! ```
//!
//! ```text
//!     there is no terminal state other than shutdown. while the link is down
//!     the cache keeps serving the last values it had.
//! ```
//!
//! relationships:
//!     - writes: cache.rs (SharedCache)
//!     - uses: transport.rs (Broker/Session), topics.rs, domain.rs (decode)
//!     - feeds: log_sink.rs (optional, never blocks)
//!
//! ==============================================================================

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::{CacheReader, LinkState, SharedCache};
use crate::config::ReconnectConfig;
use crate::domain::{decode_fields, RoomId, RoomReading};
use crate::error::{HubError, Result};
use crate::log_sink::LogSink;
use crate::topics::TopicMap;
use crate::transport::{Broker, Session};

pub struct Ingestor {
    cache: SharedCache,
    topics: TopicMap,
    log_sink: Option<LogSink>,
    reconnect: ReconnectConfig,
    show_sensor_data: bool,
}

impl Ingestor {
    /// cache starts with every room of `topics` present and empty
    pub fn new(topics: TopicMap) -> Self {
        Self {
            cache: SharedCache::new(topics.rooms()),
            topics,
            log_sink: None,
            reconnect: ReconnectConfig::default(),
            show_sensor_data: false,
        }
    }

    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn show_sensor_data(mut self, show: bool) -> Self {
        self.show_sensor_data = show;
        self
    }

    pub fn reader(&self) -> CacheReader {
        self.cache.reader()
    }

    pub fn topics(&self) -> &TopicMap {
        &self.topics
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.reconnect.initial_delay_ms))
            .with_max_delay(self.max_delay())
            .with_factor(self.reconnect.factor.max(1.0))
            .with_jitter()
            .with_max_times(usize::MAX)
    }

    fn max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect.max_delay_ms)
    }

    /// open a session subscribed to every room channel
    pub async fn connect<B: Broker>(&self, broker: &B) -> Result<B::Session> {
        self.cache.set_link_state(LinkState::Connecting).await;
        match broker.connect(&self.topics.topics()).await {
            Ok(session) => {
                self.cache.set_link_state(LinkState::Subscribed).await;
                Ok(session)
            }
            Err(e) => {
                self.cache.set_link_state(LinkState::Disconnected).await;
                Err(e)
            }
        }
    }

    /// decode and apply one message. on any error the cache is untouched.
    pub async fn on_message(&self, topic: &str, payload: &[u8]) -> Result<RoomId> {
        let room = self
            .topics
            .room_for(topic)
            .cloned()
            .ok_or_else(|| HubError::UnknownTopic(topic.to_string()))?;
        let fields = decode_fields(topic, payload)?;

        if self.show_sensor_data {
            info!(room = %room, fields = ?fields, "[MQTT] Updated");
        } else {
            debug!(room = %room, fields = fields.len(), "[MQTT] Updated");
        }

        if let Some(sink) = &self.log_sink {
            sink.record(&room, &fields);
        }
        self.cache.replace(RoomReading::new(room.clone(), fields)).await;
        Ok(room)
    }

    /// connect, receive, reconnect; until `shutdown` flips to true (or its
    /// sender is dropped)
    pub async fn run<B: Broker>(&self, broker: &B, mut shutdown: watch::Receiver<bool>) {
        let builder = self.backoff();
        let mut delays = builder.build();

        loop {
            if *shutdown.borrow() {
                break;
            }

            let connected = tokio::select! {
                result = self.connect(broker) => result,
                _ = shutdown.changed() => break,
            };

            let delay = match connected {
                Ok(mut session) => {
                    info!(
                        broker = %broker.address(),
                        rooms = self.topics.rooms().len(),
                        "[MQTT] Subscribed"
                    );

                    let outcome = self.receive(&mut session, &mut shutdown).await;
                    session.close().await;
                    match outcome {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Lost { delivered } => {
                            // only a session that carried traffic resets the backoff
                            if delivered {
                                delays = builder.build();
                            }
                            self.cache.set_link_state(LinkState::Connecting).await;
                            let delay = delays.next().unwrap_or(self.max_delay());
                            warn!(
                                delivered,
                                backoff_ms = %delay.as_millis(),
                                "[MQTT] Link lost, reconnecting after backoff"
                            );
                            delay
                        }
                    }
                }
                Err(e) => {
                    let delay = delays.next().unwrap_or(self.max_delay());
                    warn!(
                        error = %e,
                        backoff_ms = %delay.as_millis(),
                        "[MQTT] Connect failed, retrying after backoff"
                    );
                    delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.cache.set_link_state(LinkState::Disconnected).await;
        info!("[MQTT] Ingestor stopped");
    }

    async fn receive<S: Session>(
        &self,
        session: &mut S,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let mut delivered = false;
        loop {
            let next = tokio::select! {
                msg = session.recv() => msg,
                _ = shutdown.changed() => return SessionEnd::Shutdown,
            };

            match next {
                Ok(msg) => {
                    if !delivered {
                        self.cache.set_link_state(LinkState::Receiving).await;
                        delivered = true;
                    }
                    if let Err(e) = self.on_message(&msg.topic, &msg.payload).await {
                        warn!(topic = %msg.topic, error = %e, "[MQTT] Message discarded");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "[MQTT] Link lost");
                    return SessionEnd::Lost { delivered };
                }
            }
        }
    }
}

/// how a subscribed session came to an end
enum SessionEnd {
    Shutdown,
    /// transport dropped; `delivered` is true if at least one message arrived
    Lost { delivered: bool },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics::DEFAULT_ROOT;

    fn ingestor() -> Ingestor {
        let rooms = (1..=4).map(|i| RoomId::new(format!("Room {}", i)));
        Ingestor::new(TopicMap::new(DEFAULT_ROOT, rooms).unwrap())
    }

    #[tokio::test]
    async fn valid_message_replaces_only_its_room() {
        let ingestor = ingestor();
        let reader = ingestor.reader();

        let room = ingestor
            .on_message("smartbuilding/Room3", br#"{"temp":"27","airquality":"poor"}"#)
            .await
            .unwrap();
        assert_eq!(room, RoomId::from("Room 3"));

        let r3 = reader.get_reading("Room 3").await.unwrap();
        assert_eq!(r3.get("temp"), Some("27"));
        assert_eq!(r3.get("airquality"), Some("poor"));
        for other in ["Room 1", "Room 2", "Room 4"] {
            assert!(reader.get_reading(other).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn malformed_payload_leaves_previous_value() {
        let ingestor = ingestor();
        let reader = ingestor.reader();

        ingestor
            .on_message("smartbuilding/Room1", br#"{"temp":"21"}"#)
            .await
            .unwrap();
        let before = reader.get_reading("Room 1").await.unwrap();

        let err = ingestor
            .on_message("smartbuilding/Room1", br#"{"temp":"2"#)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Decode { .. }));
        assert_eq!(reader.get_reading("Room 1").await.unwrap(), before);
        assert_eq!(reader.room("Room 1").await.unwrap().updates, 1);
    }

    #[tokio::test]
    async fn unknown_topic_changes_nothing() {
        let ingestor = ingestor();
        let reader = ingestor.reader();

        let err = ingestor
            .on_message("smartbuilding/Room5", br#"{"temp":"21"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::UnknownTopic(_)));
        for reading in reader.readings().await {
            assert!(reading.is_empty());
        }
        assert!(reader.last_update().await.is_none());
    }

    #[test]
    fn backoff_is_capped() {
        let ingestor = ingestor().with_reconnect(ReconnectConfig {
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            factor: 2.0,
        });
        let delays: Vec<Duration> = ingestor.backoff().build().take(12).collect();
        assert_eq!(delays.len(), 12);
        // jitter may add up to one extra min_delay on top of the cap
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(2_000)));
    }
}
