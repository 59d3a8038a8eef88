//! smartbuilding-hub: latest sensor readings per room, fed over MQTT.
//!
//! the ingestor owns a [`cache::SharedCache`] and is its only writer; the
//! api and history poller get a [`cache::CacheReader`]. the simulator
//! publishes synthetic readings on the same channels.

pub mod api;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod history;
pub mod ingestor;
pub mod log_sink;
pub mod signals;
pub mod simulator;
pub mod telemetry;
pub mod topics;
pub mod transport;

pub use cache::{CacheReader, LinkState, SharedCache};
pub use domain::{RoomId, RoomReading};
pub use error::{HubError, Result};
pub use ingestor::Ingestor;
pub use simulator::Simulator;
