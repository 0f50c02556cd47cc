//! Loading, saving, and CLI-override merging for [`RouterConfig`].

use std::path::PathBuf;

use garlicrouter_core::config::RouterConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{default_settings_path, Result, SettingsError};

/// A loaded [`RouterConfig`] together with the path it was loaded from (or
/// will be saved to), so callers don't have to thread the path separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(flatten)]
    pub router: RouterConfig,

    #[serde(skip)]
    config_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self { router: RouterConfig::default(), config_path: None }
    }
}

impl Settings {
    pub fn load_or_default() -> Result<Self> {
        Self::load_from(&default_settings_path())
    }

    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(SettingsError::ReadError)?;
            let mut settings: Settings = serde_json::from_str(&content).map_err(SettingsError::ParseError)?;
            settings.config_path = Some(path.clone());
            info!(?path, "loaded router configuration");
            Ok(settings)
        } else {
            let mut settings = Self::default();
            settings.config_path = Some(path.clone());
            Ok(settings)
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = self.config_path.clone().unwrap_or_else(default_settings_path);
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(SettingsError::CreateDirError)?;
            }
        }
        let content = serde_json::to_string_pretty(self).map_err(SettingsError::ParseError)?;
        std::fs::write(path, content).map_err(SettingsError::WriteError)?;
        info!(?path, "saved router configuration");
        Ok(())
    }

    /// Apply CLI-level overrides on top of whatever was loaded from disk.
    /// Only fields the caller actually set (`Some`) are applied; the rest
    /// keep their loaded or default value.
    pub fn apply_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(floodfill) = overrides.floodfill {
            self.router.netdb.floodfill = floodfill;
        }
        if let Some(inbound_length) = overrides.inbound_tunnel_length {
            self.router.tunnels.inbound_tunnel_length = inbound_length;
        }
        if let Some(outbound_length) = overrides.outbound_tunnel_length {
            self.router.tunnels.outbound_tunnel_length = outbound_length;
        }
    }
}

/// Command-line overrides a binary entry point may apply on top of a
/// loaded [`Settings`], before the router starts.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub floodfill: Option<bool>,
    pub inbound_tunnel_length: Option<u8>,
    pub outbound_tunnel_length: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_router_config_default() {
        let settings = Settings::default();
        assert_eq!(settings.router, RouterConfig::default());
    }

    #[test]
    fn settings_serialization_round_trips() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let parsed: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.router, settings.router);
    }

    #[test]
    fn overrides_apply_only_set_fields() {
        let mut settings = Settings::default();
        let original_outbound = settings.router.tunnels.outbound_tunnel_length;

        settings.apply_overrides(&CliOverrides { floodfill: Some(true), inbound_tunnel_length: Some(4), outbound_tunnel_length: None });

        assert!(settings.router.netdb.floodfill);
        assert_eq!(settings.router.tunnels.inbound_tunnel_length, 4);
        assert_eq!(settings.router.tunnels.outbound_tunnel_length, original_outbound);
    }
}
