//! # Core Module
//!
//! Shared abstractions that the interception, registry and dispatch layers
//! are configured through.
//!
//! ## Organization
//!
//! - **Config**: Typed configuration for logging, interception and dispatch

pub mod config;

pub use config::{DispatchConfig, InterceptionConfig, LoggingConfig, RelayConfig, CONFIG_ENV_VAR};
