//! # Relay Configuration
//!
//! Typed configuration for every subsystem, loadable from TOML or RON through
//! the [`Config`] trait.
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [interception]
//! legacy_compositor_versions = false
//!
//! [dispatch]
//! enabled_families = ["d3d11", "d3d12", "opengl", "vulkan"]
//! track_format = true
//! reinit_on_source_change = false
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};
use crate::runtime::ApiFamily;

/// Environment variable holding the path of the configuration file
pub const CONFIG_ENV_VAR: &str = "VR_RELAY_CONFIG";

/// # Logging Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `env_logger` filter string, e.g. `"info"` or `"warn,vr_relay=debug"`
    pub level: String,
}

impl LoggingConfig {
    /// Create a logging configuration with the given filter
    pub fn new(level: impl Into<String>) -> Self {
        Self { level: level.into() }
    }

    /// Validate the filter string
    ///
    /// Every `module=level` directive must name a known level. Bare
    /// directives are either a level or a module path and are accepted.
    pub fn validate(&self) -> Result<(), String> {
        if self.level.trim().is_empty() {
            return Err("Log level cannot be empty".to_string());
        }

        let directives = self.level.split('/').next().unwrap_or_default();
        for directive in directives.split(',').map(str::trim).filter(|d| !d.is_empty()) {
            if let Some((_, level)) = directive.split_once('=') {
                level
                    .trim()
                    .parse::<log::LevelFilter>()
                    .map_err(|_| format!("Unknown log level in directive '{directive}'"))?;
            }
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new("info")
    }
}

/// # Interception Configuration
///
/// Controls which compositor interface revisions get their `Submit` slot
/// patched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptionConfig {
    /// Also hook revisions 7 and 8, whose `Submit` takes a raw texture
    /// handle instead of a texture struct
    pub legacy_compositor_versions: bool,
}

impl InterceptionConfig {
    /// Enable or disable the legacy revisions
    pub fn with_legacy_versions(mut self, enabled: bool) -> Self {
        self.legacy_compositor_versions = enabled;
        self
    }
}

/// # Dispatch Configuration
///
/// Controls which API families are relayed and what counts as a change
/// that forces a runtime to be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// API families whose frames are relayed; others are forwarded untouched
    pub enabled_families: Vec<ApiFamily>,
    /// Rebuild when the pixel format changes, for families that report one
    pub track_format: bool,
    /// Rebuild when the submitted texture object changes at equal size
    pub reinit_on_source_change: bool,
}

impl DispatchConfig {
    /// Create a dispatch configuration relaying every family
    pub fn new() -> Self {
        Self {
            enabled_families: ApiFamily::ALL.to_vec(),
            track_format: true,
            reinit_on_source_change: false,
        }
    }

    /// Restrict relaying to the given families
    pub fn with_families(mut self, families: impl IntoIterator<Item = ApiFamily>) -> Self {
        self.enabled_families = families.into_iter().collect();
        self
    }

    /// Enable or disable format tracking
    pub fn with_format_tracking(mut self, enabled: bool) -> Self {
        self.track_format = enabled;
        self
    }

    /// Enable or disable rebuilding on texture object change
    pub fn with_source_tracking(mut self, enabled: bool) -> Self {
        self.reinit_on_source_change = enabled;
        self
    }

    /// Whether frames of `family` are relayed
    pub fn is_enabled(&self, family: ApiFamily) -> bool {
        self.enabled_families.contains(&family)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for family in &self.enabled_families {
            if !seen.insert(family) {
                return Err(format!("API family '{family}' listed more than once"));
            }
        }
        Ok(())
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Complete Relay Configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Interception configuration
    pub interception: InterceptionConfig,
    /// Dispatch configuration
    pub dispatch: DispatchConfig,
}

impl RelayConfig {
    /// Load the file named by [`CONFIG_ENV_VAR`], or defaults when it is unset
    pub fn discover() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => {
                let config = Self::load_from_file(path)?;
                config.validate().map_err(ConfigError::Invalid)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Set the logging configuration
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Set the interception configuration
    pub fn with_interception(mut self, interception: InterceptionConfig) -> Self {
        self.interception = interception;
        self
    }

    /// Set the dispatch configuration
    pub fn with_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), String> {
        self.logging.validate()?;
        self.dispatch.validate()?;
        Ok(())
    }
}

impl Config for RelayConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("vr_relay_{}_{name}", std::process::id()))
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.interception.legacy_compositor_versions);
        assert_eq!(config.dispatch.enabled_families, ApiFamily::ALL.to_vec());
    }

    #[test]
    fn test_load_toml_with_missing_sections() {
        let path = scratch_file("partial.toml");
        std::fs::write(
            &path,
            "[dispatch]\nenabled_families = [\"vulkan\", \"d3d12\"]\n",
        )
        .unwrap();

        let config = RelayConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.logging, LoggingConfig::default());
        assert!(config.dispatch.is_enabled(ApiFamily::Vulkan));
        assert!(config.dispatch.is_enabled(ApiFamily::D3d12));
        assert!(!config.dispatch.is_enabled(ApiFamily::OpenGl));
        assert!(config.dispatch.track_format);
    }

    #[test]
    fn test_save_and_load_ron() {
        let path = scratch_file("full.ron");
        let config = RelayConfig::default()
            .with_interception(InterceptionConfig::default().with_legacy_versions(true))
            .with_logging(LoggingConfig::new("debug"));

        config.save_to_file(&path).unwrap();
        let loaded = RelayConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_unsupported_extension() {
        let path = scratch_file("config.json");
        std::fs::write(&path, "{}").unwrap();
        let result = RelayConfig::load_from_file(&path);
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_invalid_log_directive() {
        assert!(LoggingConfig::new("vr_relay=loud").validate().is_err());
        assert!(LoggingConfig::new("  ").validate().is_err());
        assert!(LoggingConfig::new("warn,vr_relay=trace").validate().is_ok());
        assert!(LoggingConfig::new("vr_relay").validate().is_ok());
    }

    #[test]
    fn test_duplicate_families_rejected() {
        let dispatch = DispatchConfig::new().with_families([ApiFamily::D3d11, ApiFamily::D3d11]);
        assert!(dispatch.validate().is_err());
    }
}
