//! Tracing setup for the hub binary.
//!
//! tracing goes up before the config is read, so the filter sits behind a
//! reload layer and `logging.level` is applied once the file is loaded.
//! SMARTBUILDING_LOG, when set, always wins.

use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

/// env var that overrides `logging.level`
pub const LOG_ENV: &str = "SMARTBUILDING_LOG";

pub struct LogLevelHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

/// Initialize tracing from SMARTBUILDING_LOG, defaulting to "info".
pub fn init_tracing() -> LogLevelHandle {
    let (filter, from_env) = match EnvFilter::try_from_env(LOG_ENV) {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new("info"), false),
    };
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
    LogLevelHandle { handle, from_env }
}

impl LogLevelHandle {
    /// switch to the configured level unless the env var pinned one
    pub fn apply_config_level(&self, level: &str) {
        if self.from_env {
            return;
        }
        match EnvFilter::try_new(level) {
            Ok(filter) => {
                if let Err(e) = self.handle.reload(filter) {
                    tracing::warn!(error = %e, "[CONFIG] Could not apply log level");
                }
            }
            Err(e) => {
                tracing::warn!(level = %level, error = %e, "[CONFIG] Invalid log level, keeping info");
            }
        }
    }
}
