//! ==============================================================================
//! api.rs - read-only json api over the cache
//! ==============================================================================
//!
//! routes:
//!     GET /api                          all rooms, last update, link state
//!     GET /api/rooms/{room}             one room (404 if not configured)
//!     GET /api/rooms/{room}/history     rolling temp/humidity samples
//!     GET /health                       liveness of the broker link
//!
//! room names travel url-encoded, e.g. /api/rooms/Room%202
//!
//! relationships:
//!     - reads: cache.rs (CacheReader), history.rs
//!     - never writes anything
//!
//! ==============================================================================

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

use crate::cache::{CacheReader, CacheSnapshot, LinkState, RoomSnapshot};
use crate::history::{History, Sample};

#[derive(Clone)]
pub struct ApiState {
    pub cache: CacheReader,
    pub history: History,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub link: LinkState,
    pub live: bool,
    pub last_update: Option<DateTime<Utc>>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api", get(snapshot_handler))
        .route("/api/rooms/:room", get(room_handler))
        .route("/api/rooms/:room/history", get(history_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(bind: &str, state: ApiState, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(bind = %bind, "[API] Listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    Ok(())
}

async fn snapshot_handler(State(state): State<ApiState>) -> Json<CacheSnapshot> {
    Json(state.cache.snapshot().await)
}

async fn room_handler(
    State(state): State<ApiState>,
    Path(room): Path<String>,
) -> Result<Json<RoomSnapshot>, StatusCode> {
    state
        .cache
        .room(&room)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn history_handler(
    State(state): State<ApiState>,
    Path(room): Path<String>,
) -> Result<Json<Vec<Sample>>, StatusCode> {
    if state.cache.get_reading(&room).await.is_none() {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(state.history.samples(&room).await))
}

async fn health_handler(State(state): State<ApiState>) -> Json<Health> {
    let link = state.cache.link_state().await;
    Json(Health {
        link,
        live: link.is_live(),
        last_update: state.cache.last_update().await,
    })
}
