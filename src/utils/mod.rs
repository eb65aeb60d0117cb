//! Configuration and process setup helpers.

/// Tracing subscriber installation.
pub mod logging;
/// TOML configuration with hot reload.
pub mod toml_config;
