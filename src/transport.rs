//! ==============================================================================
//! transport.rs - broker seam and the MQTT implementation
//! ==============================================================================
//!
//! purpose:
//!     the ingestor and simulator talk to the broker only through the traits
//!     below, so tests can drive them with in-memory fakes and the real build
//!     uses rumqttc.
//!
//! ```text
//!     - Broker:  connect + subscribe, within a bounded timeout
//!     - Session: one live subscription; yields messages until the link drops
//!     - Outbox:  fire-and-forget publish (simulator side)
//! ```
//!
//! relationships:
//!     - used by: ingestor.rs (Broker/Session), simulator.rs (Outbox)
//!     - uses: rumqttc (MQTT 3.1.1 client + event loop)
//!
//! ==============================================================================

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS,
    SubscribeFilter, SubscribeReasonCode,
};
use tokio::task::JoinHandle;

use crate::config::BrokerConfig;
use crate::error::{HubError, Result};

/// rumqttc refuses keepalives shorter than this
const MIN_KEEPALIVE: Duration = Duration::from_secs(5);

/// one message as delivered by the broker
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inbound {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait Broker: Send + Sync {
    type Session: Session;

    /// open a session and subscribe to every topic. fails with
    /// `HubError::Connection` on refusal, network error, or timeout.
    async fn connect(&self, topics: &[String]) -> Result<Self::Session>;

    /// "host:port", for logs and errors
    fn address(&self) -> String;
}

#[async_trait]
pub trait Session: Send {
    /// wait for the next message. `HubError::TransportDisconnect` ends the
    /// session; the caller reconnects.
    async fn recv(&mut self) -> Result<Inbound>;

    /// best-effort clean disconnect
    async fn close(&mut self);
}

#[async_trait]
pub trait Outbox: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;
}

fn mqtt_options(config: &BrokerConfig, client_id: &str) -> MqttOptions {
    let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
    options.set_keep_alive(config.keepalive().max(MIN_KEEPALIVE));
    options.set_clean_session(true);
    options
}

/// MQTT 3.1.1 brokers only have to accept client ids up to this length
pub const MAX_CLIENT_ID_LEN: usize = 23;

/// `<prefix>-<role initial><pid in hex>`, prefix cut so the whole id fits in
/// MAX_CLIENT_ID_LEN. ids must be unique per broker and the public reference
/// broker is shared.
pub fn client_id(prefix: &str, role: &str) -> String {
    let initial = role.chars().next().unwrap_or('x');
    let suffix = format!("-{}{:x}", initial, std::process::id());
    let budget = MAX_CLIENT_ID_LEN.saturating_sub(suffix.len());
    let mut cut = prefix.len().min(budget);
    while !prefix.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &prefix[..cut], suffix)
}

// ==============================================================================
// ingestor side
// ==============================================================================

pub struct MqttBroker {
    config: BrokerConfig,
    client_id: String,
}

impl MqttBroker {
    pub fn new(config: BrokerConfig, client_id: String) -> Self {
        Self { config, client_id }
    }
}

pub struct MqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
    /// publishes that arrived while we were waiting for the SUBACK
    pending: VecDeque<Inbound>,
}

#[async_trait]
impl Broker for MqttBroker {
    type Session = MqttSession;

    async fn connect(&self, topics: &[String]) -> Result<MqttSession> {
        let broker = self.address();
        let connection_err = |reason: String| HubError::Connection {
            broker: broker.clone(),
            reason,
        };

        let options = mqtt_options(&self.config, &self.client_id);
        let (client, mut eventloop) = AsyncClient::new(options, topics.len().max(10));
        let mut pending = VecDeque::new();

        let handshake = async {
            wait_for_connack(&mut eventloop).await?;

            let filters = topics
                .iter()
                .map(|t| SubscribeFilter::new(t.clone(), QoS::AtMostOnce));
            client
                .subscribe_many(filters)
                .await
                .map_err(|e| format!("subscribe request failed: {}", e))?;

            wait_for_suback(&mut eventloop, &mut pending).await
        };

        let timeout = self.config.connect_timeout();
        let outcome = tokio::time::timeout(timeout, handshake).await;
        match outcome {
            Ok(Ok(())) => Ok(MqttSession {
                client,
                eventloop,
                pending,
            }),
            Ok(Err(reason)) => Err(connection_err(reason)),
            Err(_) => Err(connection_err(format!("timed out after {:?}", timeout))),
        }
    }

    fn address(&self) -> String {
        self.config.address()
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> std::result::Result<(), String> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(format!("handshake rejected: {:?}", ack.code))
                };
            }
            Ok(_) => continue,
            Err(e) => return Err(e.to_string()),
        }
    }
}

async fn wait_for_suback(
    eventloop: &mut EventLoop,
    pending: &mut VecDeque<Inbound>,
) -> std::result::Result<(), String> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                let rejected = ack
                    .return_codes
                    .iter()
                    .filter(|c| matches!(c, SubscribeReasonCode::Failure))
                    .count();
                return if rejected == 0 {
                    Ok(())
                } else {
                    Err(format!("broker rejected {} subscription(s)", rejected))
                };
            }
            Ok(Event::Incoming(Packet::Publish(p))) => pending.push_back(Inbound {
                topic: p.topic,
                payload: p.payload.to_vec(),
            }),
            Ok(_) => continue,
            Err(e) => return Err(e.to_string()),
        }
    }
}

#[async_trait]
impl Session for MqttSession {
    async fn recv(&mut self) -> Result<Inbound> {
        if let Some(msg) = self.pending.pop_front() {
            return Ok(msg);
        }
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(p))) => {
                    return Ok(Inbound {
                        topic: p.topic,
                        payload: p.payload.to_vec(),
                    })
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    return Err(HubError::TransportDisconnect(
                        "broker closed the session".to_string(),
                    ))
                }
                Ok(_) => continue,
                Err(e) => return Err(HubError::TransportDisconnect(e.to_string())),
            }
        }
    }

    async fn close(&mut self) {
        if self.client.try_disconnect().is_err() {
            return;
        }
        // drive the loop until the DISCONNECT is on the wire
        let flush = async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
        };
        let _ = tokio::time::timeout(Duration::from_secs(1), flush).await;
    }
}

// ==============================================================================
// simulator side
// ==============================================================================

/// publishing client with its event loop driven on a background task.
/// rumqttc reconnects on the next poll after an error, so the driver only
/// backs off and keeps polling.
pub struct MqttOutbox {
    client: AsyncClient,
    driver: JoinHandle<()>,
}

impl MqttOutbox {
    pub fn start(config: &BrokerConfig, client_id: &str, capacity: usize) -> Self {
        let options = mqtt_options(config, client_id);
        let (client, mut eventloop) = AsyncClient::new(options, capacity.max(10));
        let address = config.address();

        let driver = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        tracing::info!(broker = %address, "[SIM] Connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(broker = %address, error = %e, "[SIM] Broker link error, retrying");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self { client, driver }
    }

    pub async fn shutdown(self) {
        let _ = self.client.try_disconnect();
        // give the driver a moment to flush the DISCONNECT
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.driver.abort();
    }
}

#[async_trait]
impl Outbox for MqttOutbox {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        // try_publish: a dead link must not stall the publish cycle
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| HubError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}
