//! Shared ambient stack for the toolrunner workspace: error taxonomy,
//! layered configuration, and tracing initialization.

pub mod config;
pub mod errors;
pub mod telemetry;

pub use config::RuntimeConfig;
pub use errors::{ErrorType, RuntimeError};
