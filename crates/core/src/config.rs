//! Router configuration types.
//!
//! Plain data only — loading from disk, merging CLI overrides, and
//! validation live in `garlicrouter-settings`.

use crate::types::BandwidthClass;
use serde::{Deserialize, Serialize};

/// Top-level router configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub tunnels: TunnelSettings,

    #[serde(default)]
    pub netdb: NetDbSettings,

    #[serde(default)]
    pub transports: TransportSettings,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            tunnels: TunnelSettings::default(),
            netdb: NetDbSettings::default(),
            transports: TransportSettings::default(),
        }
    }
}

/// Tunnel pool sizing. Defaults match a typical client profile: two hops
/// each way, five tunnels in each direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunnelSettings {
    #[serde(default = "default_tunnel_length")]
    pub inbound_tunnel_length: u8,

    #[serde(default = "default_tunnel_length")]
    pub outbound_tunnel_length: u8,

    #[serde(default = "default_tunnels_quantity")]
    pub inbound_tunnels_quantity: u8,

    #[serde(default = "default_tunnels_quantity")]
    pub outbound_tunnels_quantity: u8,
}

fn default_tunnel_length() -> u8 {
    2
}

fn default_tunnels_quantity() -> u8 {
    5
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            inbound_tunnel_length: default_tunnel_length(),
            outbound_tunnel_length: default_tunnel_length(),
            inbound_tunnels_quantity: default_tunnels_quantity(),
            outbound_tunnels_quantity: default_tunnels_quantity(),
        }
    }
}

/// NetDB participation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetDbSettings {
    /// Routers to always keep in the peer set regardless of profile or
    /// NetDB churn, specified by identity hash (hex-encoded).
    #[serde(default)]
    pub explicit_peers: Vec<String>,

    /// Whether this router participates in the floodfill subset.
    #[serde(default)]
    pub floodfill: bool,
}

impl Default for NetDbSettings {
    fn default() -> Self {
        Self {
            explicit_peers: Vec::new(),
            floodfill: false,
        }
    }
}

/// Transport-adjacent settings: which transports are enabled and the
/// declared bandwidth class advertised in this router's own `RouterInfo`.
/// The transports themselves are not implemented here (out of scope); this
/// only controls what gets published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportSettings {
    #[serde(default = "default_bandwidth")]
    pub bandwidth: BandwidthClass,

    #[serde(default = "default_true")]
    pub enable_ntcp: bool,

    #[serde(default = "default_true")]
    pub enable_ssu: bool,
}

fn default_bandwidth() -> BandwidthClass {
    BandwidthClass::L
}

fn default_true() -> bool {
    true
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            bandwidth: default_bandwidth(),
            enable_ntcp: true,
            enable_ssu: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tunnel_settings() {
        let cfg = RouterConfig::default();
        assert_eq!(cfg.tunnels.inbound_tunnel_length, 2);
        assert_eq!(cfg.tunnels.outbound_tunnel_length, 2);
        assert_eq!(cfg.tunnels.inbound_tunnels_quantity, 5);
        assert_eq!(cfg.tunnels.outbound_tunnels_quantity, 5);
    }

    #[test]
    fn default_netdb_settings() {
        let cfg = RouterConfig::default();
        assert!(!cfg.netdb.floodfill);
        assert!(cfg.netdb.explicit_peers.is_empty());
    }

    #[test]
    fn default_transport_settings() {
        let cfg = RouterConfig::default();
        assert_eq!(cfg.transports.bandwidth, BandwidthClass::L);
        assert!(cfg.transports.enable_ntcp);
        assert!(cfg.transports.enable_ssu);
    }

    #[test]
    fn config_serialization_round_trip() {
        let cfg = RouterConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let parsed: RouterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, parsed);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{"netdb":{"floodfill":true}}"#;
        let cfg: RouterConfig = serde_json::from_str(json).unwrap();
        assert!(cfg.netdb.floodfill);
        assert_eq!(cfg.tunnels.inbound_tunnel_length, 2);
    }
}
