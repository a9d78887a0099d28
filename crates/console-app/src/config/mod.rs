//! Configuration file parsing for the console bridge
//!
//! Supports `<config_dir>/console-bridge/config.toml` (or an explicit path).
//! Every key is optional.

pub mod settings;
pub mod types;

pub use settings::{default_settings_path, load_settings, load_settings_strict, save_settings};
pub use types::*;
