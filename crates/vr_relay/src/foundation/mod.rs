//! Foundation module - Core utilities shared by every layer
//!
//! - Logging setup and re-exported log macros
//! - Panic containment at host-facing boundaries

pub mod logging;
pub mod panic;
