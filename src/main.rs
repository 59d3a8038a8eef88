//! ==============================================================================
//! main.rs - smartbuilding hub entry point
//! ==============================================================================
//!
//! purpose:
//!     one binary, two roles (chosen by `cluster.role` in host.toml):
//!
//! ```text
//!     - ingestor:  subscribes to every room channel, keeps the latest reading
//!                  per room in memory, serves it over a json api
//!     - simulator: publishes a random reading per room every few seconds
//! ```
//!
//! architecture (ingestor role):
//!
//! ```text
//!     ┌──────────────────────────────────────────────────────────────┐
//!     │                    rust host (this file)                     │
//!     │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────┐   │
//!     │  │ ingestor     │  │ web server   │  │ history poller    │   │
//!     │  │ (mqtt loop)  │  │ (port 3000)  │  │ (2s cycle)        │   │
//!     │  └──────┬───────┘  └──────┬───────┘  └─────────┬─────────┘   │
//!     │         │ writes          │ reads              │ reads       │
//!     │         └────────────┬────┴────────────────────┘             │
//!     │                ┌─────┴─────┐                                 │
//!     │                │   cache   │ <- cache.rs                     │
//!     │                └───────────┘                                 │
//!     │         │                                                    │
//!     │         └──> log sink (append-only jsonl, background task)   │
//!     └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! shutdown:
//!     ctrl-c or SIGTERM flips a watch channel; every task drains and exits.
//!
//! ==============================================================================

use anyhow::Result;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use smartbuilding_hub::api::{self, ApiState};
use smartbuilding_hub::config::{HostConfig, Role};
use smartbuilding_hub::history::History;
use smartbuilding_hub::log_sink::LogSink;
use smartbuilding_hub::signals::StopSignals;
use smartbuilding_hub::telemetry;
use smartbuilding_hub::topics::TopicMap;
use smartbuilding_hub::transport::{client_id, MqttBroker, MqttOutbox};
use smartbuilding_hub::{Ingestor, Simulator};

#[tokio::main]
async fn main() -> Result<()> {
    let log = telemetry::init_tracing();
    info!("Smart Building Hub starting");

    // step 1: load configuration
    let config = HostConfig::load_or_default()?;
    log.apply_config_level(&config.logging.level);
    config.log_summary();
    let topics = config.topic_map()?;

    // step 2: shutdown signal shared by every task
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signals = StopSignals::listen()?;
    tokio::spawn(async move {
        match signals.recv().await {
            Ok(name) => {
                info!(signal = name, "[SHUTDOWN] Stop signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                // no signal handling: keep the sender alive and run until killed
                error!(error = %e, "[SHUTDOWN] Cannot listen for stop signals");
                std::future::pending::<()>().await;
            }
        }
    });

    // step 3: run the selected role
    match config.cluster.role {
        Role::Ingestor => run_ingestor(&config, topics, shutdown_rx).await,
        Role::Simulator => run_simulator(&config, topics, shutdown_rx).await,
    }
}

async fn run_ingestor(
    config: &HostConfig,
    topics: TopicMap,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut ingestor = Ingestor::new(topics)
        .with_reconnect(config.reconnect.clone())
        .show_sensor_data(config.logging.show_sensor_data);

    let sink_task = if config.log_sink.enabled {
        let (sink, handle) =
            LogSink::spawn(config.log_sink.path.clone(), config.log_sink.queue_capacity);
        ingestor = ingestor.with_log_sink(sink);
        info!(path = %config.log_sink.path.display(), "[STARTUP] ✓ Log sink ready");
        Some(handle)
    } else {
        None
    };

    let reader = ingestor.reader();
    let history = History::new(config.history.max_points);

    let history_task = {
        let history = history.clone();
        let reader = reader.clone();
        let every = Duration::from_secs(config.history.poll_interval_seconds);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { history.run(reader, every, shutdown).await })
    };

    let api_task = if config.api.enabled {
        let bind = config.api.bind.clone();
        let state = ApiState {
            cache: reader.clone(),
            history: history.clone(),
        };
        let shutdown = shutdown.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = api::serve(&bind, state, shutdown).await {
                error!(error = %e, "[API] Web server error");
            }
        }))
    } else {
        None
    };

    // the mqtt loop gets its own task so consumers never sit in its path
    let broker = MqttBroker::new(config.broker.clone(), client_id(&config.broker.client_id, "ingestor"));
    info!(broker = %config.broker.address(), "[STARTUP] Connecting ingestor");
    let ingest_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { ingestor.run(&broker, shutdown).await })
    };

    // the ingestor owns the last LogSink sender; once it is gone the sink drains
    ingest_task.await?;
    if let Some(handle) = sink_task {
        handle.await?;
    }
    history_task.await?;
    if let Some(handle) = api_task {
        handle.await?;
    }
    info!("[SHUTDOWN] Ingestor role stopped");
    Ok(())
}

async fn run_simulator(
    config: &HostConfig,
    topics: TopicMap,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let outbox = MqttOutbox::start(
        &config.broker,
        &client_id(&config.broker.client_id, "simulator"),
        topics.rooms().len(),
    );
    let simulator = Simulator::new(
        outbox,
        topics,
        Duration::from_secs(config.simulator.interval_seconds),
    )
    .show_sensor_data(config.logging.show_sensor_data);

    simulator.run(shutdown).await;
    simulator.into_outbox().shutdown().await;
    info!("[SHUTDOWN] Simulator role stopped");
    Ok(())
}
