//! Shared utilities for the redis-kv workspace
//!
//! Provides the ambient pieces every crate in the workspace needs:
//! - layered configuration loading (files + environment)
//! - logging initialization

pub mod config;
pub mod error;
pub mod logging;

// Re-exports for convenience
pub use error::{Error, Result};
pub use logging::{build_layers, init_logging, LogConfig, LogFormat, LogRotation};
