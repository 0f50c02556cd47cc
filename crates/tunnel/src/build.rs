//! C5: the tunnel build protocol state machine — assembling, dispatching,
//! and interpreting the onion-wrapped 8-record build message.

use crate::error::{Result, TunnelError};
use crate::record::{BuildRecord, BuildRecordFields, HopStatus, FLAG_INBOUND_GATEWAY, FLAG_OUTBOUND_ENDPOINT};
use garlicrouter_crypto::elgamal::PublicKey;
use rand::seq::SliceRandom;
use rand::RngCore;
use std::time::{Duration, Instant};

/// Fixed build messages always carry 8 records on the wire.
pub const FIXED_RECORD_COUNT: usize = 8;
/// Variable builds may carry between 1 and 8.
pub const MAX_VARIABLE_RECORD_COUNT: usize = 8;

pub const BUILD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelRole {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Pending,
    BuildReplyReceived,
    Established,
    BuildFailed,
}

/// Per-hop keys generated for this build, kept so the reply can be
/// peeled back in reverse order.
#[derive(Debug, Clone)]
pub struct HopKeys {
    pub layer_key: [u8; 32],
    pub iv_key: [u8; 32],
    pub reply_key: [u8; 32],
    pub reply_iv: [u8; 16],
}

impl HopKeys {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut layer_key = [0u8; 32];
        let mut iv_key = [0u8; 32];
        let mut reply_key = [0u8; 32];
        let mut reply_iv = [0u8; 16];
        rng.fill_bytes(&mut layer_key);
        rng.fill_bytes(&mut iv_key);
        rng.fill_bytes(&mut reply_key);
        rng.fill_bytes(&mut reply_iv);
        Self {
            layer_key,
            iv_key,
            reply_key,
            reply_iv,
        }
    }
}

/// One hop participating in a tunnel being built.
#[derive(Debug, Clone)]
pub struct HopSpec {
    pub identity_hash: [u8; 32],
    pub public_key: PublicKey,
    pub tunnel_id: u32,
}

/// Tracks an in-flight tunnel build from dispatch to resolution.
pub struct PendingBuild {
    pub role: TunnelRole,
    pub hops: Vec<HopSpec>,
    pub hop_keys: Vec<HopKeys>,
    /// Wire-message slot each real hop's record was placed in, in hop
    /// order. Needed to peel the reply's onion layers back off.
    pub real_positions: Vec<usize>,
    pub send_message_id: u32,
    pub state: BuildState,
    dispatched_at: Instant,
}

impl PendingBuild {
    /// Assemble a new build: generate per-hop keys and lay out the
    /// `record_count`-slot message with real hops at shuffled positions
    /// and random fill elsewhere. Returns the pending build plus the
    /// records to dispatch, in wire order.
    pub fn create(role: TunnelRole, hops: Vec<HopSpec>, record_count: usize) -> Result<(Self, Vec<BuildRecord>)> {
        if hops.is_empty() || hops.len() > MAX_VARIABLE_RECORD_COUNT {
            return Err(TunnelError::Overflow(format!("invalid hop count {}", hops.len())));
        }
        if record_count < hops.len() || record_count > MAX_VARIABLE_RECORD_COUNT {
            return Err(TunnelError::Overflow(format!("invalid record count {record_count}")));
        }

        let send_message_id = rand::thread_rng().next_u32();
        let hop_keys: Vec<HopKeys> = hops.iter().map(|_| HopKeys::generate()).collect();
        let request_time_hours = (now_secs() / 3600) as u32;

        let mut positions: Vec<usize> = (0..record_count).collect();
        positions.shuffle(&mut rand::thread_rng());
        let real_positions: Vec<usize> = positions[..hops.len()].to_vec();

        let mut records: Vec<Option<BuildRecord>> = vec![None; record_count];
        for (i, hop) in hops.iter().enumerate() {
            let next_tunnel = hops.get(i + 1).map(|h| h.tunnel_id).unwrap_or(0);
            let next_ident = hops.get(i + 1).map(|h| h.identity_hash).unwrap_or([0u8; 32]);

            let mut flags = 0u8;
            if i + 1 == hops.len() && role == TunnelRole::Outbound {
                flags |= FLAG_OUTBOUND_ENDPOINT;
            }
            if i == 0 && role == TunnelRole::Inbound {
                flags |= FLAG_INBOUND_GATEWAY;
            }

            let fields = BuildRecordFields {
                receive_tunnel: hop.tunnel_id,
                local_ident: hop.identity_hash,
                next_tunnel,
                next_ident,
                layer_key: hop_keys[i].layer_key,
                iv_key: hop_keys[i].iv_key,
                reply_key: hop_keys[i].reply_key,
                reply_iv: hop_keys[i].reply_iv,
                flags,
                request_time_hours,
                send_message_id,
            };

            let record = BuildRecord::encrypt(&hop.identity_hash, &hop.public_key, &fields)?;
            records[real_positions[i]] = Some(record);
        }

        for slot in records.iter_mut() {
            if slot.is_none() {
                *slot = Some(random_fill_record());
            }
        }
        let mut records: Vec<BuildRecord> = records.into_iter().map(|r| r.unwrap()).collect();

        // Onion pre-image: starting from the second-to-last real hop,
        // each earlier hop's reply-key/reply-IV encrypts every record at a
        // later real position so the pre-image inverts as replies
        // propagate backward through the chain.
        for i in (0..hops.len().saturating_sub(1)).rev() {
            let keys = &hop_keys[i];
            for later in &real_positions[i + 1..] {
                records[*later].reply_encrypt_in_place(&keys.reply_key, &keys.reply_iv)?;
            }
        }

        Ok((
            Self {
                role,
                hops,
                hop_keys,
                real_positions,
                send_message_id,
                state: BuildState::Pending,
                dispatched_at: Instant::now(),
            },
            records,
        ))
    }

    pub fn is_timed_out(&self, now: Instant) -> bool {
        now.duration_since(self.dispatched_at) >= BUILD_TIMEOUT
    }

    /// Peel the reply message's onion layers back off — the exact inverse
    /// of the pre-image walk in [`Self::create`], applied in ascending hop
    /// order so each layer is removed in the order it was added during
    /// forwarding — then read every hop's status and resolve the build's
    /// state. `records` must be the full wire-order reply message, with
    /// each real hop's slot already carrying the reply-key layering its
    /// predecessors added while relaying the build request onward (the
    /// transit-hop side of that relay lives in the manager's participant
    /// role, not here).
    pub fn resolve_reply(&self, mut records: Vec<BuildRecord>) -> Result<Vec<HopStatus>> {
        if records.len() <= self.real_positions.iter().copied().max().unwrap_or(0) {
            return Err(TunnelError::Malformed("reply message shorter than build message".into()));
        }

        for i in 0..self.hops.len().saturating_sub(1) {
            let keys = &self.hop_keys[i];
            for later in &self.real_positions[i + 1..] {
                records[*later].reply_decrypt_in_place(&keys.reply_key, &keys.reply_iv)?;
            }
        }

        let statuses: Result<Vec<HopStatus>> = self
            .real_positions
            .iter()
            .map(|pos| crate::record::read_reply_payload(&records[*pos].to_bytes()))
            .collect();
        statuses
    }

    /// Apply [`Self::resolve_reply`] and update `self.state` from the
    /// result.
    pub fn resolve_reply_and_transition(&mut self, records: Vec<BuildRecord>) -> Result<Vec<HopStatus>> {
        let statuses = self.resolve_reply(records)?;
        self.state = if statuses.iter().all(|s| s.is_accepted()) {
            BuildState::Established
        } else {
            BuildState::BuildFailed
        };
        Ok(statuses)
    }

    pub fn fail_on_timeout(&mut self) {
        self.state = BuildState::BuildFailed;
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_secs()
}

fn random_fill_record() -> BuildRecord {
    let mut target_hash_prefix = [0u8; crate::record::TARGET_HASH_PREFIX_SIZE];
    let mut encrypted = [0u8; crate::record::ENCRYPTED_INNER_SIZE];
    let mut rng = rand::thread_rng();
    rng.fill_bytes(&mut target_hash_prefix);
    rng.fill_bytes(&mut encrypted);
    BuildRecord {
        target_hash_prefix,
        encrypted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::build_reply_payload;
    use garlicrouter_crypto::elgamal::generate_keypair;

    fn sample_hops(n: usize) -> Vec<HopSpec> {
        (0..n)
            .map(|i| {
                let (public_key, _) = generate_keypair();
                HopSpec {
                    identity_hash: [i as u8 + 1; 32],
                    public_key,
                    tunnel_id: 100 + i as u32,
                }
            })
            .collect()
    }

    #[test]
    fn create_fills_all_requested_records() {
        let hops = sample_hops(3);
        let (build, records) = PendingBuild::create(TunnelRole::Outbound, hops, FIXED_RECORD_COUNT).unwrap();
        assert_eq!(records.len(), FIXED_RECORD_COUNT);
        assert_eq!(build.state, BuildState::Pending);
    }

    #[test]
    fn too_many_hops_rejected() {
        let hops = sample_hops(9);
        assert!(PendingBuild::create(TunnelRole::Outbound, hops, FIXED_RECORD_COUNT).is_err());
    }

    #[test]
    fn fresh_build_is_not_timed_out() {
        let hops = sample_hops(2);
        let (build, _) = PendingBuild::create(TunnelRole::Outbound, hops, FIXED_RECORD_COUNT).unwrap();
        assert!(!build.is_timed_out(Instant::now()));
    }

    #[test]
    fn timeout_marks_build_failed() {
        let hops = sample_hops(1);
        let (mut build, _) = PendingBuild::create(TunnelRole::Outbound, hops, FIXED_RECORD_COUNT).unwrap();
        build.fail_on_timeout();
        assert_eq!(build.state, BuildState::BuildFailed);
    }

    /// Simulates what each real hop's record looks like by the time the
    /// reply travels all the way back: the same pre-image layering
    /// [`PendingBuild::create`] applied, wrapped around each hop's raw
    /// status payload instead of the original ElGamal ciphertext.
    fn wrap_replies_like_request(build: &PendingBuild, statuses: &[HopStatus]) -> Vec<BuildRecord> {
        let mut records: Vec<BuildRecord> = build
            .real_positions
            .iter()
            .zip(statuses)
            .map(|(_, status)| BuildRecord::from_bytes(&build_reply_payload(*status)).unwrap())
            .collect();

        for i in (0..build.hops.len().saturating_sub(1)).rev() {
            let keys = &build.hop_keys[i];
            for later_idx in (i + 1)..build.hops.len() {
                records[later_idx].reply_encrypt_in_place(&keys.reply_key, &keys.reply_iv).unwrap();
            }
        }
        records
    }

    #[test]
    fn resolve_reply_recovers_all_accepted_statuses() {
        let hops = sample_hops(4);
        let (mut build, _) = PendingBuild::create(TunnelRole::Outbound, hops, FIXED_RECORD_COUNT).unwrap();
        let sent_statuses = vec![HopStatus::Accepted; 4];
        let hop_order_records = wrap_replies_like_request(&build, &sent_statuses);

        let mut wire: Vec<BuildRecord> = (0..FIXED_RECORD_COUNT).map(|_| random_fill_record()).collect();
        for (hop_idx, pos) in build.real_positions.clone().into_iter().enumerate() {
            wire[pos] = hop_order_records[hop_idx].clone();
        }

        let statuses = build.resolve_reply_and_transition(wire).unwrap();
        assert!(statuses.iter().all(|s| s.is_accepted()));
        assert_eq!(build.state, BuildState::Established);
    }

    #[test]
    fn resolve_reply_fails_build_on_any_rejection() {
        let hops = sample_hops(3);
        let (mut build, _) = PendingBuild::create(TunnelRole::Outbound, hops, FIXED_RECORD_COUNT).unwrap();
        let sent_statuses = vec![HopStatus::Accepted, HopStatus::Rejected(30), HopStatus::Accepted];
        let hop_order_records = wrap_replies_like_request(&build, &sent_statuses);

        let mut wire: Vec<BuildRecord> = (0..FIXED_RECORD_COUNT).map(|_| random_fill_record()).collect();
        for (hop_idx, pos) in build.real_positions.clone().into_iter().enumerate() {
            wire[pos] = hop_order_records[hop_idx].clone();
        }

        build.resolve_reply_and_transition(wire).unwrap();
        assert_eq!(build.state, BuildState::BuildFailed);
    }
}
