//! C10: a local garlic destination — demultiplexes inbound garlic
//! messages, owns every outbound session to every remote it talks to, and
//! drives lease-set publishing and tag-bundle ACK bookkeeping.

use crate::clove::{Clove, DeliveryType};
use crate::error::{GarlicError, Result};
use crate::session::{parse_aes_block, GarlicSession, SessionTag};
use garlicrouter_core::lease_set::LeaseSet;
use garlicrouter_crypto::elgamal::{self, PrivateKey, PublicKey};
use garlicrouter_crypto::layered_aes::cbc_decrypt;
use garlicrouter_i2np::message::{self, MessageType};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// An incoming session tag is usable for this long after installation.
pub const INCOMING_TAG_LIFETIME: Duration = Duration::from_secs(15 * 60);
pub const GC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default clove/message lifetime once an outbound garlic is assembled.
const CLOVE_LIFETIME_MS: u64 = 5_000;

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_millis() as u64
}

/// What an inbound garlic's decrypted clove resolves to, once dispatched
/// by delivery type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GarlicDeliveryOutcome {
    /// Hand the embedded message to this router's own I2NP handler.
    Local(Vec<u8>),
    /// Forward via an outbound tunnel to the named gateway.
    ForwardTunnel { gateway_hash: [u8; 32], tunnel_id: u32, message_bytes: Vec<u8> },
}

/// One local identity able to receive and originate garlic messages.
pub struct GarlicDestination {
    pub identity_hash: [u8; 32],
    private_key: PrivateKey,
    public_key: PublicKey,
    sessions: HashMap<[u8; 32], GarlicSession>,
    /// Tag -> (session key it decrypts under, installation time). Each
    /// entry is consumed on first use.
    incoming_tags: HashMap<SessionTag, ([u8; 32], Instant)>,
    /// messageID of a sent DeliveryStatus clove -> the remote session it
    /// was sent on behalf of, so the matching ACK can be routed back.
    created_sessions: HashMap<u32, [u8; 32]>,
    last_gc: Option<Instant>,
}

impl GarlicDestination {
    pub fn new(identity_hash: [u8; 32], private_key: PrivateKey, public_key: PublicKey) -> Self {
        Self {
            identity_hash,
            private_key,
            public_key,
            sessions: HashMap::new(),
            incoming_tags: HashMap::new(),
            created_sessions: HashMap::new(),
            last_gc: None,
        }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Install a (session key, tag) pair into this destination's own
    /// incoming tag table, ahead of sending a message that the remote is
    /// expected to route back through one of our own inbound tunnels.
    pub fn submit_session_key(&mut self, session_key: [u8; 32], tag: SessionTag, now: Instant) {
        self.incoming_tags.insert(tag, (session_key, now));
    }

    fn session_mut(&mut self, remote_hash: [u8; 32], num_tags: usize, attach_leaseset: bool) -> &mut GarlicSession {
        self.sessions.entry(remote_hash).or_insert_with(|| GarlicSession::new(num_tags, attach_leaseset))
    }

    /// Wrap `payload_clove` (the caller's message, already addressed
    /// `Local` or `Destination`) for `remote_hash`, opportunistically
    /// bundling a lease-set update and a self-addressed DeliveryStatus
    /// ACK clove. Returns the finished garlic payload bytes (ready to
    /// become an I2NP `Garlic` message) and the messageID assigned to it.
    pub fn wrap_message(
        &mut self,
        remote_hash: [u8; 32],
        payload_clove: Clove,
        remote_public_key: Option<&PublicKey>,
        own_inbound_gateway: Option<([u8; 32], u32)>,
        leaseset: Option<&LeaseSet>,
        attach_leaseset: bool,
        now: Instant,
    ) -> Result<(Vec<u8>, u32)> {
        let num_tags = if attach_leaseset { crate::session::NUM_TAGS_CONNECTION } else { crate::session::NUM_TAGS_LOOKUP };
        self.session_mut(remote_hash, num_tags, attach_leaseset);

        let message_id = rand::thread_rng().next_u32();
        let will_mint = self.sessions[&remote_hash].needs_new_tags(now);
        let session = self.sessions.get_mut(&remote_hash).expect("just inserted");
        session.reconsider_lease_set_submission(now);
        let leaseset_due = session.lease_set_update_status == crate::session::LeaseSetUpdateStatus::Updated;

        let mut cloves = Vec::with_capacity(3);
        let mut ack_clove_sent = false;
        if will_mint || leaseset_due {
            match own_inbound_gateway {
                Some((gateway_hash, tunnel_id)) => {
                    cloves.push(self.build_delivery_status_clove(message_id, gateway_hash, tunnel_id, now)?);
                    ack_clove_sent = true;
                }
                None => warn!("garlic: no inbound tunnel available to carry a DeliveryStatus ACK"),
            }
        }
        if leaseset_due {
            if let Some(leaseset) = leaseset {
                cloves.push(build_database_store_clove(leaseset)?);
                self.sessions.get_mut(&remote_hash).unwrap().mark_lease_set_submitted(message_id, now);
            }
        }
        cloves.push(payload_clove);

        let payload = encode_garlic_payload(&cloves, message_id, now_ms() + CLOVE_LIFETIME_MS);
        let session = self.sessions.get_mut(&remote_hash).unwrap();
        let (wrapped, _minted) = session.wrap_payload_minting_if_needed(message_id, &payload, remote_public_key, now)?;

        if ack_clove_sent {
            self.created_sessions.insert(message_id, remote_hash);
        }
        Ok((wrapped, message_id))
    }

    fn build_delivery_status_clove(
        &mut self,
        message_id: u32,
        gateway_hash: [u8; 32],
        tunnel_id: u32,
        now: Instant,
    ) -> Result<Clove> {
        let mut ds_payload = Vec::with_capacity(12);
        ds_payload.extend_from_slice(&message_id.to_be_bytes());
        ds_payload.extend_from_slice(&now_ms().to_be_bytes());
        let ds_message = message::build(MessageType::DeliveryStatus, ds_payload, None)?;
        let ds_bytes = message::serialize(&ds_message);

        let inner_clove = Clove {
            delivery_type: DeliveryType::Local,
            message_bytes: ds_bytes,
            clove_id: rand::thread_rng().next_u32(),
            expiration_ms: now_ms() + CLOVE_LIFETIME_MS,
        };
        let inner_payload = encode_garlic_payload(&[inner_clove], rand::thread_rng().next_u32(), now_ms() + CLOVE_LIFETIME_MS);

        let mut ephemeral_key = [0u8; 32];
        let mut ephemeral_tag = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut ephemeral_key);
        rand::thread_rng().fill_bytes(&mut ephemeral_tag);
        self.submit_session_key(ephemeral_key, ephemeral_tag, now);

        let mut inner_session = GarlicSession::one_shot(ephemeral_key, ephemeral_tag, now);
        let inner_wrapped = inner_session.wrap_payload(&inner_payload, None, None, now)?;
        let inner_garlic_message = message::build(MessageType::Garlic, inner_wrapped, None)?;
        let inner_bytes = message::serialize(&inner_garlic_message);

        Ok(Clove {
            delivery_type: DeliveryType::Tunnel { gateway_hash, tunnel_id },
            message_bytes: inner_bytes,
            clove_id: message_id,
            expiration_ms: now_ms() + CLOVE_LIFETIME_MS,
        })
    }

    /// Demultiplex an inbound garlic's payload (the bytes after the I2NP
    /// header): tag lookup first, ElGamal fallback second, then dispatch
    /// every clove by delivery type. A clove whose delivery type is
    /// unsupported (`Router`) is skipped; the rest of the bundle is still
    /// processed.
    pub fn handle_garlic_message(&mut self, message_payload: &[u8], now: Instant) -> Result<Vec<GarlicDeliveryOutcome>> {
        if message_payload.len() < 4 {
            return Err(GarlicError::Malformed("garlic message shorter than length prefix".into()));
        }
        let declared_len = u32::from_be_bytes(message_payload[0..4].try_into().unwrap()) as usize;
        let body = &message_payload[4..];
        if body.len() < declared_len {
            return Err(GarlicError::Malformed("garlic message shorter than declared length".into()));
        }
        let body = &body[..declared_len];

        if body.len() < 32 {
            return Err(GarlicError::Malformed("garlic message shorter than a session tag".into()));
        }
        let mut tag = [0u8; 32];
        tag.copy_from_slice(&body[..32]);

        let (session_key, iv, encrypted_start) = if let Some((key, _installed_at)) = self.incoming_tags.remove(&tag) {
            (key, derive_iv(&tag), 32)
        } else {
            if body.len() < elgamal::CIPHERTEXT_SIZE {
                return Err(GarlicError::Malformed("garlic message too short for an ElGamal block".into()));
            }
            let ciphertext: [u8; elgamal::CIPHERTEXT_SIZE] = body[..elgamal::CIPHERTEXT_SIZE].try_into().unwrap();
            let plaintext = elgamal::decrypt(&self.private_key, &ciphertext)?;
            let mut session_key = [0u8; 32];
            session_key.copy_from_slice(&plaintext[..32]);
            let pre_iv = &plaintext[32..64];
            (session_key, derive_iv(pre_iv), elgamal::CIPHERTEXT_SIZE)
        };

        let mut encrypted = body[encrypted_start..].to_vec();
        cbc_decrypt(&session_key, &iv, &mut encrypted)?;
        let (new_tags, payload) = parse_aes_block(&encrypted)?;
        for new_tag in new_tags {
            self.submit_session_key(session_key, new_tag, now);
        }

        self.dispatch_cloves(&payload)
    }

    fn dispatch_cloves(&self, payload: &[u8]) -> Result<Vec<GarlicDeliveryOutcome>> {
        if payload.is_empty() {
            return Err(GarlicError::Malformed("empty garlic payload".into()));
        }
        let num_cloves = payload[0] as usize;
        let mut offset = 1;
        let mut outcomes = Vec::with_capacity(num_cloves);

        for _ in 0..num_cloves {
            if offset >= payload.len() {
                return Err(GarlicError::Malformed("clove bundle truncated".into()));
            }
            let (clove, consumed) = Clove::decode(&payload[offset..])?;
            offset += consumed;
            match clove.delivery_type {
                DeliveryType::Local => outcomes.push(GarlicDeliveryOutcome::Local(clove.message_bytes)),
                // Only local destinations can decrypt a garlic in the
                // first place, so the identity hash here is informational.
                DeliveryType::Destination { .. } => outcomes.push(GarlicDeliveryOutcome::Local(clove.message_bytes)),
                DeliveryType::Tunnel { gateway_hash, tunnel_id } => {
                    outcomes.push(GarlicDeliveryOutcome::ForwardTunnel { gateway_hash, tunnel_id, message_bytes: clove.message_bytes })
                }
                DeliveryType::Router { .. } => {
                    warn!("garlic: Router-delivery clove is not supported, skipping just this clove");
                }
            }
        }
        Ok(outcomes)
    }

    /// Handle a `DeliveryStatus` message's payload (not garlic-wrapped —
    /// it arrives as its own I2NP type). Advances whichever outbound
    /// session sent the acknowledged messageID.
    pub fn handle_delivery_status(&mut self, payload: &[u8], now: Instant) -> Result<()> {
        if payload.len() < 4 {
            return Err(GarlicError::Malformed("DeliveryStatus payload too short".into()));
        }
        let message_id = u32::from_be_bytes(payload[0..4].try_into().unwrap());
        if let Some(remote_hash) = self.created_sessions.remove(&message_id) {
            if let Some(session) = self.sessions.get_mut(&remote_hash) {
                session.confirm_tag_bundle(message_id, now);
                session.mark_lease_set_confirmed(message_id);
            }
        }
        Ok(())
    }

    /// Periodic expiry: drop incoming tags past [`INCOMING_TAG_LIFETIME`]
    /// and any session left with neither live tags nor an unconfirmed
    /// bundle in flight.
    pub fn run_gc(&mut self, now: Instant) {
        self.incoming_tags.retain(|_, (_, installed_at)| now.duration_since(*installed_at) < INCOMING_TAG_LIFETIME);
        self.sessions.retain(|_, session| session.cleanup_expired(now));
        self.last_gc = Some(now);
    }

    pub fn due_for_gc(&self, now: Instant) -> bool {
        match self.last_gc {
            None => true,
            Some(last) => now.duration_since(last) >= GC_INTERVAL,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

fn derive_iv(seed: &[u8]) -> [u8; 16] {
    Sha256::digest(seed)[..16].try_into().unwrap()
}

fn encode_garlic_payload(cloves: &[Clove], message_id: u32, expiration_ms: u64) -> Vec<u8> {
    let mut out = vec![cloves.len() as u8];
    for clove in cloves {
        out.extend_from_slice(&clove.encode());
    }
    out.extend_from_slice(&[0u8; 3]); // certificate
    out.extend_from_slice(&message_id.to_be_bytes());
    out.extend_from_slice(&expiration_ms.to_be_bytes());
    out
}

fn build_database_store_clove(leaseset: &LeaseSet) -> Result<Clove> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&leaseset.destination);
    payload.push(0); // store type: 0 = LeaseSet
    payload.extend_from_slice(&0u32.to_be_bytes()); // reply token: no floodfill reply requested
    payload.extend_from_slice(&leaseset.to_bytes());
    let message = message::build(MessageType::DatabaseStore, payload, None)?;
    Ok(Clove {
        delivery_type: DeliveryType::Local,
        message_bytes: message::serialize(&message),
        clove_id: rand::thread_rng().next_u32(),
        expiration_ms: now_ms() + CLOVE_LIFETIME_MS,
    })
}
