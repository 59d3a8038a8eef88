//! ==============================================================================
//! log_sink.rs - append-only record of decoded readings
//! ==============================================================================
//!
//! purpose:
//!     keeps a json-lines trail of every reading the ingestor applied:
//!
//! ```text
//!         {"timestamp":"2026-10-19T08:15:02.118Z","room":"Room 2","data":{...}}
//! ```
//!
//! ```text
//!     one line per record, appended, never re-read.
//! ```
//!
//! failure policy:
//!     nothing here can reach the cache or stop the ingestor. the ingestor
//!     only does a try_send into a bounded queue; a full queue drops the
//!     record, and file errors are logged and the file reopened on the
//!     next record.
//!
//! ==============================================================================

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::{Fields, RoomId};
use crate::error::{HubError, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub room: RoomId,
    pub data: Fields,
}

/// sending half handed to the ingestor
#[derive(Clone)]
pub struct LogSink {
    tx: mpsc::Sender<LogRecord>,
}

impl LogSink {
    /// start the writer task. it exits once every `LogSink` clone is dropped
    /// and the queue is drained.
    pub fn spawn(path: PathBuf, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_writer(path, rx));
        (Self { tx }, handle)
    }

    /// queue a record without waiting
    pub fn record(&self, room: &RoomId, data: &Fields) {
        let record = LogRecord {
            timestamp: Utc::now(),
            room: room.clone(),
            data: data.clone(),
        };
        if let Err(e) = self.tx.try_send(record) {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "writer stopped",
            };
            tracing::warn!(room = %room, reason, "[LOG] Dropped log record");
        }
    }
}

async fn run_writer(path: PathBuf, mut rx: mpsc::Receiver<LogRecord>) {
    let mut file: Option<File> = None;

    while let Some(record) = rx.recv().await {
        if file.is_none() {
            match open_append(&path).await {
                Ok(f) => file = Some(f),
                Err(e) => {
                    tracing::warn!(error = %e, "[LOG] Cannot open log file, record skipped");
                    continue;
                }
            }
        }
        if let Some(f) = file.as_mut() {
            if let Err(e) = append(f, &record).await {
                tracing::warn!(error = %e, "[LOG] Append failed, reopening on next record");
                file = None;
            }
        }
    }

    if let Some(mut f) = file {
        let _ = f.flush().await;
    }
    tracing::debug!(path = %path.display(), "[LOG] Writer stopped");
}

pub async fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| HubError::LogSink(format!("open {}: {}", path.display(), e)))
}

pub async fn append(file: &mut File, record: &LogRecord) -> Result<()> {
    let mut line =
        serde_json::to_vec(record).map_err(|e| HubError::LogSink(e.to_string()))?;
    line.push(b'\n');
    file.write_all(&line)
        .await
        .map_err(|e| HubError::LogSink(e.to_string()))
}
