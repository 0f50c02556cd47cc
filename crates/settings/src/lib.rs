//! Router configuration management: loading, saving, and merging CLI
//! overrides on top of [`garlicrouter_core::config::RouterConfig`].
//!
//! ## Usage
//!
//! ```no_run
//! use garlicrouter_settings::Settings;
//!
//! let mut settings = Settings::load_or_default()?;
//! settings.router.tunnels.inbound_tunnel_length = 3;
//! settings.save()?;
//! # Ok::<(), garlicrouter_settings::SettingsError>(())
//! ```

mod config;

pub use config::{CliOverrides, Settings};

use std::path::PathBuf;

use thiserror::Error;
use garlicrouter_keystore::default_config_dir;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    ReadError(std::io::Error),

    #[error("Failed to write settings: {0}")]
    WriteError(std::io::Error),

    #[error("Failed to parse settings: {0}")]
    ParseError(serde_json::Error),

    #[error("Failed to create config directory: {0}")]
    CreateDirError(std::io::Error),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Get the default settings file path
pub fn default_settings_path() -> PathBuf {
    default_config_dir().join("settings.json")
}
