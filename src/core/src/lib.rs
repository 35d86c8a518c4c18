//! Ocify Core - Foundational Types
//!
//! Error types, configuration, and logging setup shared by the
//! Docker-to-OCI conversion engine.

pub mod config;
pub mod error;
pub mod log;

// Re-export commonly used types
pub use config::{ConvertConfig, LayerBuffer};
pub use error::{ConvertError, Result, StageExt};
pub use log::{init_tracing, LogConfig, LogFormat, LogLevel};

/// Ocify version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
