//! Logging utilities
//!
//! The relay lives inside someone else's process, so initialization never
//! panics and never replaces a logger the host already installed.

pub use log::{debug, error, info, trace, warn};

use crate::core::config::LoggingConfig;

/// Environment variable that overrides the configured filter
pub const LOG_ENV_VAR: &str = "VR_RELAY_LOG";

/// Initialize the logging system from configuration
///
/// Returns `false` when a logger was already installed.
pub fn init(config: &LoggingConfig) -> bool {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(&config.level);
    if let Ok(filters) = std::env::var(LOG_ENV_VAR) {
        builder.parse_filters(&filters);
    }
    builder.format_timestamp_millis();
    builder.try_init().is_ok()
}
