//! ==============================================================================
//! error.rs - error taxonomy for the hub
//! ==============================================================================
//!
//! purpose:
//!     one enum for every failure the library surfaces. the binary wraps these
//!     in anyhow at the edge; inside the crate everything is `Result<T>`.
//!
//! recovery policy:
//!     - Connection / TransportDisconnect: retried by the ingestor with backoff
//!     - Decode / UnknownTopic: message dropped, loop continues
//!     - LogSink: logged and swallowed
//!     - Publish: logged, simulator moves on to the next room
//!     - Config: fatal at startup
//!
//! ==============================================================================

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HubError>;

#[derive(Debug, Error)]
pub enum HubError {
    /// broker unreachable, handshake rejected, or connect timed out
    #[error("connection to {broker} failed: {reason}")]
    Connection { broker: String, reason: String },

    /// malformed or structurally invalid payload
    #[error("failed to decode payload on '{topic}': {reason}")]
    Decode { topic: String, reason: String },

    /// message arrived on a channel that maps to no known room
    #[error("no room subscribed on topic '{0}'")]
    UnknownTopic(String),

    /// session dropped after it was established
    #[error("transport disconnected: {0}")]
    TransportDisconnect(String),

    #[error("log sink: {0}")]
    LogSink(String),

    #[error("publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_broker() {
        let err = HubError::Connection {
            broker: "broker.hivemq.com:1883".into(),
            reason: "timed out after 10s".into(),
        };
        assert_eq!(
            err.to_string(),
            "connection to broker.hivemq.com:1883 failed: timed out after 10s"
        );
    }
}
