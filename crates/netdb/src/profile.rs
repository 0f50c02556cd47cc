//! Peer profiling: per-peer build-participation history used by tunnel
//! peer selection to avoid routers that habitually fail to reply. This is
//! not part of the wire protocol; it is local bookkeeping the kovri router
//! keeps that the distilled message-plane description omits.

use std::time::{Duration, Instant};

/// A peer is dropped from consideration once its failure rate over the
/// tracked window exceeds this share of attempts, provided enough samples
/// have accumulated to be meaningful.
const MIN_SAMPLES_BEFORE_JUDGING: u32 = 5;
const FAILURE_RATIO_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct PeerProfile {
    pub replied_count: u32,
    pub non_replied_count: u32,
    last_seen: Option<Instant>,
}

impl Default for PeerProfile {
    fn default() -> Self {
        Self {
            replied_count: 0,
            non_replied_count: 0,
            last_seen: None,
        }
    }
}

impl PeerProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_reply(&mut self, now: Instant) {
        self.replied_count += 1;
        self.last_seen = Some(now);
    }

    pub fn record_non_reply(&mut self, now: Instant) {
        self.non_replied_count += 1;
        self.last_seen = Some(now);
    }

    pub fn total_attempts(&self) -> u32 {
        self.replied_count + self.non_replied_count
    }

    pub fn failure_ratio(&self) -> f64 {
        if self.total_attempts() == 0 {
            0.0
        } else {
            self.non_replied_count as f64 / self.total_attempts() as f64
        }
    }

    /// Whether this peer should be skipped for new tunnel builds: enough
    /// history has accumulated, and most of it was failures.
    pub fn is_unreliable(&self) -> bool {
        self.total_attempts() >= MIN_SAMPLES_BEFORE_JUDGING && self.failure_ratio() > FAILURE_RATIO_THRESHOLD
    }

    pub fn last_seen_within(&self, window: Duration, now: Instant) -> bool {
        self.last_seen.is_some_and(|seen| now.duration_since(seen) <= window)
    }
}

/// Per-router history, keyed by identity hash.
#[derive(Debug, Default)]
pub struct ProfileTable {
    profiles: std::collections::HashMap<[u8; 32], PeerProfile>,
}

impl ProfileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_reply(&mut self, peer: [u8; 32], now: Instant) {
        self.profiles.entry(peer).or_default().record_reply(now);
    }

    pub fn record_non_reply(&mut self, peer: [u8; 32], now: Instant) {
        self.profiles.entry(peer).or_default().record_non_reply(now);
    }

    pub fn is_unreliable(&self, peer: &[u8; 32]) -> bool {
        self.profiles.get(peer).is_some_and(PeerProfile::is_unreliable)
    }

    pub fn get(&self, peer: &[u8; 32]) -> Option<&PeerProfile> {
        self.profiles.get(peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_profile_is_not_unreliable() {
        let profile = PeerProfile::new();
        assert!(!profile.is_unreliable());
    }

    #[test]
    fn mostly_failing_profile_is_unreliable() {
        let mut profile = PeerProfile::new();
        let now = Instant::now();
        for _ in 0..4 {
            profile.record_non_reply(now);
        }
        profile.record_reply(now);
        assert!(profile.is_unreliable());
    }

    #[test]
    fn mostly_replying_profile_is_reliable() {
        let mut profile = PeerProfile::new();
        let now = Instant::now();
        for _ in 0..8 {
            profile.record_reply(now);
        }
        profile.record_non_reply(now);
        assert!(!profile.is_unreliable());
    }

    #[test]
    fn below_minimum_samples_never_judged_unreliable() {
        let mut profile = PeerProfile::new();
        let now = Instant::now();
        profile.record_non_reply(now);
        profile.record_non_reply(now);
        assert!(!profile.is_unreliable());
    }

    #[test]
    fn profile_table_tracks_per_peer() {
        let mut table = ProfileTable::new();
        let now = Instant::now();
        for _ in 0..6 {
            table.record_non_reply([1u8; 32], now);
        }
        table.record_reply([2u8; 32], now);
        assert!(table.is_unreliable(&[1u8; 32]));
        assert!(!table.is_unreliable(&[2u8; 32]));
    }

    #[test]
    fn unknown_peer_defaults_to_reliable() {
        let table = ProfileTable::new();
        assert!(!table.is_unreliable(&[9u8; 32]));
    }
}
