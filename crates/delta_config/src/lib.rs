//! Parsing and validation of `delta.toml` incremental build configuration.
//!
//! This crate reads the configuration file and produces a strongly-typed
//! [`IncrementalConfig`] describing where caches and outputs live, which
//! files count as sources, and which incremental strategies are enabled.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use types::*;
