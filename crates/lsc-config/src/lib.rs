//! Configuration system for the logical session cache.
//!
//! Provides TOML-based configuration with:
//! - A `[session]` section carrying the cache tunables
//! - A `[logging]` section for the file log layer
//! - Config file layering (user config dir + project-local overrides)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigLayer, ConfigPaths, ConfigSource, LayerStatus, LoadedConfig, read_config_file,
    user_config_dir, write_config_file,
};
pub use error::{ConfigError, Result};
pub use types::*;
