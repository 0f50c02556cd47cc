//! The in-memory NetDB store: peers, leasesets, and the floodfill subset.

use crate::error::{NetDbError, Result};
use crate::routing_key::{routing_key, today_yyyymmdd, xor_distance};
use crate::wire::{DatabaseStorePayload, STORE_TYPE_LEASESET, STORE_TYPE_ROUTER_INFO};
use crate::RouterInfo;
use dashmap::DashMap;
use dashmap::DashSet;
use garlicrouter_core::lease_set::LeaseSet;
use rand::seq::IteratorRandom;

/// Shared, lock-free-ish NetDB store. Cheap to clone (all fields are
/// `Arc`-backed containers), matching the pool/manager pattern used
/// elsewhere in the router: subsystems hold a handle, not the data.
#[derive(Debug, Default, Clone)]
pub struct NetDb {
    peers: std::sync::Arc<DashMap<[u8; 32], RouterInfo>>,
    leasesets: std::sync::Arc<DashMap<[u8; 32], LeaseSet>>,
    floodfills: std::sync::Arc<DashSet<[u8; 32]>>,
}

impl NetDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse-then-verify-then-store path for a peer descriptor received off
    /// the wire: a signature that does not verify is never stored, and an
    /// existing entry is only replaced by one with a strictly newer
    /// timestamp.
    pub fn add_peer(&self, info: RouterInfo) -> Result<()> {
        info.verify_signature().map_err(|_| NetDbError::BadSignature)?;

        let hash = info.identity_hash();
        if let Some(existing) = self.peers.get(&hash) {
            if info.timestamp <= existing.timestamp {
                return Ok(());
            }
        }

        if info.is_floodfill() {
            self.floodfills.insert(hash);
        } else {
            self.floodfills.remove(&hash);
        }
        self.peers.insert(hash, info);
        Ok(())
    }

    pub fn find_peer(&self, hash: &[u8; 32]) -> Option<RouterInfo> {
        self.peers.get(hash).map(|r| r.clone())
    }

    pub fn remove_peer(&self, hash: &[u8; 32]) {
        self.peers.remove(hash);
        self.floodfills.remove(hash);
    }

    pub fn add_leaseset(&self, leaseset: LeaseSet) {
        self.leasesets.insert(leaseset.destination, leaseset);
    }

    /// Apply a DatabaseStore payload: parse its `store_type` and commit a
    /// `RouterInfo` through [`Self::add_peer`] (signature- and
    /// freshness-checked) or a `LeaseSet` through [`Self::add_leaseset`].
    /// Returns the stored record's key on success.
    pub fn handle_database_store(&self, payload: &[u8]) -> Result<[u8; 32]> {
        let parsed = DatabaseStorePayload::parse(payload)?;
        match parsed.store_type {
            STORE_TYPE_ROUTER_INFO => {
                let info = RouterInfo::from_bytes(&parsed.data)?;
                self.add_peer(info)?;
            }
            STORE_TYPE_LEASESET => {
                let leaseset = LeaseSet::from_bytes(&parsed.data)
                    .map_err(|e| NetDbError::Malformed(e.to_string()))?;
                self.add_leaseset(leaseset);
            }
            other => return Err(NetDbError::Malformed(format!("unknown store type {other}"))),
        }
        Ok(parsed.key)
    }

    pub fn find_leaseset(&self, destination: &[u8; 32]) -> Option<LeaseSet> {
        self.leasesets.get(destination).map(|r| r.clone())
    }

    pub fn remove_leaseset(&self, destination: &[u8; 32]) {
        self.leasesets.remove(destination);
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn floodfill_count(&self) -> usize {
        self.floodfills.len()
    }

    /// A peer satisfying `filter`, drawn uniformly at random from every
    /// matching candidate (not just the first one iteration happens to
    /// reach), or `None` if the store is empty or nothing matches. Tunnel
    /// hop selection depends on this being unbiased.
    pub fn random_peer(&self, filter: impl Fn(&RouterInfo) -> bool) -> Option<RouterInfo> {
        let mut rng = rand::thread_rng();
        self.peers
            .iter()
            .filter(|entry| filter(entry.value()))
            .choose(&mut rng)
            .map(|entry| entry.value().clone())
    }

    /// The single floodfill peer whose routing key (for today, UTC) is
    /// closest by XOR distance to `key`, excluding any hash in `excluded`.
    pub fn closest_floodfill(&self, key: &[u8; 32], excluded: &[[u8; 32]]) -> Option<RouterInfo> {
        self.closest_floodfills(key, 1, excluded).into_iter().next()
    }

    /// The `n` closest floodfills to `key` by routing-key XOR distance,
    /// excluding any hash in `excluded`.
    pub fn closest_floodfills(&self, key: &[u8; 32], n: usize, excluded: &[[u8; 32]]) -> Vec<RouterInfo> {
        let today = today_yyyymmdd();
        let mut candidates: Vec<(Vec<u8>, RouterInfo)> = self
            .floodfills
            .iter()
            .filter(|hash| !excluded.contains(hash.key()))
            .filter_map(|hash| {
                let hash = *hash.key();
                let info = self.peers.get(&hash)?.clone();
                let rk = routing_key(&hash, today);
                let dist = xor_distance(key, &rk).to_vec();
                Some((dist, info))
            })
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(&b.0));
        candidates.into_iter().take(n).map(|(_, info)| info).collect()
    }
}
