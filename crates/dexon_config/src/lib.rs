//! Parsing and validation of `dexon.toml` project configuration files.
//!
//! This crate reads the project configuration file and produces a strongly-typed
//! [`ProjectConfig`]: the multidex mode, main dex entry criteria, incremental
//! folder and the libraries the build depends on.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, load_main_dex_list, normalize_class_entry};
pub use types::*;
