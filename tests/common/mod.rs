//! In-memory broker fakes for driving the ingestor and simulator without a
//! network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use smartbuilding_hub::config::ReconnectConfig;
use smartbuilding_hub::error::{HubError, Result};
use smartbuilding_hub::topics::{TopicMap, DEFAULT_ROOT};
use smartbuilding_hub::transport::{Broker, Inbound, Outbox, Session};
use smartbuilding_hub::{CacheReader, LinkState, RoomId};

pub fn reference_topics() -> TopicMap {
    let rooms = (1..=4).map(|i| RoomId::new(format!("Room {}", i)));
    TopicMap::new(DEFAULT_ROOT, rooms).unwrap()
}

pub fn fast_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        initial_delay_ms: 10,
        max_delay_ms: 100,
        factor: 2.0,
    }
}

/// feeds one session; dropping it ends the session with a disconnect
pub type SessionFeed = mpsc::UnboundedSender<Result<Inbound>>;

pub struct FakeSession {
    rx: mpsc::UnboundedReceiver<Result<Inbound>>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl Session for FakeSession {
    async fn recv(&mut self) -> Result<Inbound> {
        match self.rx.recv().await {
            Some(msg) => msg,
            None => Err(HubError::TransportDisconnect("feed closed".to_string())),
        }
    }

    async fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

enum Attempt {
    Refuse,
    Accept(FakeSession),
}

/// replays a fixed script of connect outcomes, then refuses forever
#[derive(Default)]
pub struct ScriptedBroker {
    script: Mutex<VecDeque<Attempt>>,
    pub attempts: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
    pub subscriptions: Mutex<Vec<Vec<String>>>,
}

impl ScriptedBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse(&self) {
        self.script.lock().unwrap().push_back(Attempt::Refuse);
    }

    /// queue a successful connect and return the feed for its session
    pub fn accept(&self) -> SessionFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.script.lock().unwrap().push_back(Attempt::Accept(FakeSession {
            rx,
            closed: self.closed.clone(),
        }));
        tx
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broker for ScriptedBroker {
    type Session = FakeSession;

    async fn connect(&self, topics: &[String]) -> Result<FakeSession> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Attempt::Accept(session)) => {
                self.subscriptions.lock().unwrap().push(topics.to_vec());
                Ok(session)
            }
            Some(Attempt::Refuse) | None => Err(HubError::Connection {
                broker: self.address(),
                reason: "refused by script".to_string(),
            }),
        }
    }

    fn address(&self) -> String {
        "fake:1883".to_string()
    }
}

/// accepts every connect and hands out sessions that are already dead
#[derive(Default)]
pub struct FlappingBroker {
    pub attempts: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
}

impl FlappingBroker {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broker for FlappingBroker {
    type Session = FakeSession;

    async fn connect(&self, _topics: &[String]) -> Result<FakeSession> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let (_tx, rx) = mpsc::unbounded_channel();
        Ok(FakeSession {
            rx,
            closed: self.closed.clone(),
        })
    }

    fn address(&self) -> String {
        "flapping:1883".to_string()
    }
}

pub fn message(topic: &str, payload: &str) -> Result<Inbound> {
    Ok(Inbound {
        topic: topic.to_string(),
        payload: payload.as_bytes().to_vec(),
    })
}

/// records everything published; optionally fails for one topic
#[derive(Default)]
pub struct RecordingOutbox {
    pub sent: Mutex<Vec<Inbound>>,
    pub fail_topic: Option<String>,
}

#[async_trait]
impl Outbox for RecordingOutbox {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if self.fail_topic.as_deref() == Some(topic) {
            return Err(HubError::Publish {
                topic: topic.to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        self.sent.lock().unwrap().push(Inbound {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }
}

/// poll until `check` holds or a few seconds pass
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

pub async fn wait_for_link(reader: &CacheReader, want: LinkState) {
    eventually(move || async move { reader.link_state().await == want }).await;
}
