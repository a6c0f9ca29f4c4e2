//! Configuration module
//!
//! Startup configuration loaded from a TOML file and environment variables

pub mod config;

pub use config::{Config, ConfigError, Dialect, RuntimeConfig};
