//! C7: tunnel pools — maintaining a configured count of established
//! inbound/outbound tunnels, peer selection, periodic testing, and
//! recreate-before-expiry.

use garlicrouter_core::config::TunnelSettings;
use garlicrouter_netdb::NetDb;
use std::time::{Duration, Instant};

pub const TEST_INTERVAL: Duration = Duration::from_secs(15);
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const TUNNEL_LIFETIME: Duration = Duration::from_secs(600);
/// A tunnel is recreated once its remaining lifetime drops below this.
pub const RECREATE_MARGIN: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolRole {
    Inbound,
    Outbound,
}

/// One tunnel pool: a target inbound/outbound count plus the tunnels it
/// currently owns (by identity/tunnel id), tracked by creation time so
/// recreate-before-expiry and the 15s test cycle can act on them.
pub struct TunnelPool {
    pub role: PoolRole,
    pub hop_count: u8,
    pub target_count: u8,
    pub explicit_peers: Option<Vec<[u8; 32]>>,
    members: Vec<PoolMember>,
    last_test_at: Option<Instant>,
    detached: bool,
}

struct PoolMember {
    tunnel_id: u32,
    created_at: Instant,
    failed: bool,
}

impl TunnelPool {
    pub fn new(role: PoolRole, settings: &TunnelSettings) -> Self {
        let (hop_count, target_count) = match role {
            PoolRole::Inbound => (settings.inbound_tunnel_length, settings.inbound_tunnels_quantity),
            PoolRole::Outbound => (settings.outbound_tunnel_length, settings.outbound_tunnels_quantity),
        };
        Self {
            role,
            hop_count,
            target_count,
            explicit_peers: None,
            members: Vec::new(),
            last_test_at: None,
            detached: false,
        }
    }

    pub fn with_explicit_peers(mut self, peers: Vec<[u8; 32]>) -> Self {
        self.explicit_peers = Some(peers);
        self
    }

    pub fn member_count(&self) -> usize {
        self.members.iter().filter(|m| !m.failed).count()
    }

    pub fn deficit(&self) -> usize {
        (self.target_count as usize).saturating_sub(self.member_count())
    }

    pub fn add_established(&mut self, tunnel_id: u32, now: Instant) {
        self.members.push(PoolMember {
            tunnel_id,
            created_at: now,
            failed: false,
        });
    }

    pub fn mark_failed(&mut self, tunnel_id: u32) {
        if let Some(member) = self.members.iter_mut().find(|m| m.tunnel_id == tunnel_id) {
            member.failed = true;
        }
    }

    /// Tunnels whose remaining lifetime has dropped below
    /// [`RECREATE_MARGIN`] and so need a replacement spawned now.
    pub fn due_for_recreate(&self, now: Instant) -> Vec<u32> {
        self.members
            .iter()
            .filter(|m| !m.failed && now.duration_since(m.created_at) >= TUNNEL_LIFETIME.saturating_sub(RECREATE_MARGIN))
            .map(|m| m.tunnel_id)
            .collect()
    }

    pub fn should_test(&self, now: Instant) -> bool {
        match self.last_test_at {
            None => true,
            Some(last) => now.duration_since(last) >= TEST_INTERVAL,
        }
    }

    pub fn mark_tested(&mut self, now: Instant) {
        self.last_test_at = Some(now);
    }

    /// Peer selection for the next hop: explicit peers are cycled in
    /// order; otherwise a random high-bandwidth peer not already in
    /// `path_so_far` is drawn from NetDB.
    pub fn select_next_hop(&self, netdb: &NetDb, hop_index: usize, path_so_far: &[[u8; 32]]) -> Option<[u8; 32]> {
        if let Some(explicit) = &self.explicit_peers {
            return explicit.get(hop_index).copied();
        }
        netdb
            .random_peer(|peer| {
                peer.capabilities().contains(garlicrouter_core::CapabilityFlags::HIGH_BW)
                    && !path_so_far.contains(&peer.identity_hash())
            })
            .map(|peer| peer.identity_hash())
    }

    /// Mark every member "pool-less": they finish their current lifetime
    /// and are then discarded by the tunnel manager rather than renewed.
    pub fn detach(&mut self) {
        self.detached = true;
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }
}
