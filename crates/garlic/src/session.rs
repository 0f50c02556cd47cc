//! C9: garlic sessions — the symmetric session key, pre-delivered session
//! tags, and lease-set bookkeeping used to wrap an outbound payload as an
//! ElGamal-or-tagged garlic block.

use crate::error::{GarlicError, Result};
use garlicrouter_crypto::elgamal::{self, PublicKey};
use garlicrouter_crypto::layered_aes::{cbc_encrypt, KEY_SIZE as AES_KEY_SIZE};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

pub type SessionTag = [u8; 32];

/// Connections get a full bundle of tags; one-off lookups only need a few.
pub const NUM_TAGS_CONNECTION: usize = 40;
pub const NUM_TAGS_LOOKUP: usize = 4;

/// A tag older than this is no longer offered to the remote, matching the
/// sending side's bookkeeping window.
pub const OUTGOING_TAG_LIFETIME: Duration = Duration::from_secs(13 * 60);

/// A submitted lease-set is re-offered if it goes this long without the
/// confirming DeliveryStatus ACK arriving, rather than waiting indefinitely.
pub const LEASE_SET_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseSetUpdateStatus {
    DoNotSend,
    Updated,
    Submitted,
    UpToDate,
}

/// Per-remote-destination session state: the session key, the live tag
/// pool, and the confirmation bookkeeping for both tags and any pending
/// lease-set submission. Owned exclusively by the [`crate::destination::GarlicDestination`]
/// that created it — never shared across destinations.
#[derive(Debug)]
pub struct GarlicSession {
    pub session_key: [u8; AES_KEY_SIZE],
    pub num_tags: usize,
    pub lease_set_update_status: LeaseSetUpdateStatus,
    lease_set_update_msg_id: Option<u32>,
    lease_set_submission_time: Option<Instant>,
    tags: VecDeque<(SessionTag, Instant)>,
    unconfirmed_tag_bundle: HashMap<u32, (Vec<SessionTag>, Instant)>,
}

impl GarlicSession {
    /// A fresh session to a known destination: random key, no tags yet (the
    /// first message necessarily goes out ElGamal-wrapped).
    pub fn new(num_tags: usize, attach_leaseset: bool) -> Self {
        let mut session_key = [0u8; AES_KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut session_key);
        Self {
            session_key,
            num_tags,
            lease_set_update_status: if attach_leaseset {
                LeaseSetUpdateStatus::Updated
            } else {
                LeaseSetUpdateStatus::DoNotSend
            },
            lease_set_update_msg_id: None,
            lease_set_submission_time: None,
            tags: VecDeque::new(),
            unconfirmed_tag_bundle: HashMap::new(),
        }
    }

    /// A throwaway session wrapping a single already-known key/tag pair:
    /// used for the self-addressed DeliveryStatus clove, where this router
    /// installs the pair into its own incoming tag table and then uses
    /// this session, once, to encrypt the matching ACK message.
    pub fn one_shot(session_key: [u8; AES_KEY_SIZE], tag: SessionTag, now: Instant) -> Self {
        let mut tags = VecDeque::new();
        tags.push_back((tag, now));
        Self {
            session_key,
            num_tags: 1,
            lease_set_update_status: LeaseSetUpdateStatus::DoNotSend,
            lease_set_update_msg_id: None,
            lease_set_submission_time: None,
            tags,
            unconfirmed_tag_bundle: HashMap::new(),
        }
    }

    fn pop_live_tag(&mut self, now: Instant) -> Option<SessionTag> {
        while let Some((tag, created)) = self.tags.pop_front() {
            if now.duration_since(created) < OUTGOING_TAG_LIFETIME {
                return Some(tag);
            }
        }
        None
    }

    fn remaining_live_tags(&self, now: Instant) -> usize {
        self.tags.iter().filter(|(_, created)| now.duration_since(*created) < OUTGOING_TAG_LIFETIME).count()
    }

    /// True once the live pool has drained to at most two thirds of
    /// `num_tags` and a fresh batch should be minted and offered.
    pub fn needs_new_tags(&self, now: Instant) -> bool {
        self.num_tags > 0 && self.remaining_live_tags(now) * 3 <= self.num_tags * 2
    }

    fn mint_tags(&self) -> Vec<SessionTag> {
        let mut rng = rand::thread_rng();
        (0..self.num_tags)
            .map(|_| {
                let mut tag = [0u8; 32];
                rng.fill_bytes(&mut tag);
                tag
            })
            .collect()
    }

    pub fn record_unconfirmed_bundle(&mut self, message_id: u32, tags: Vec<SessionTag>, now: Instant) {
        self.unconfirmed_tag_bundle.insert(message_id, (tags, now));
    }

    /// Move a bundle's tags into the live pool once its DeliveryStatus ACK
    /// arrives, provided the bundle hasn't itself expired in the meantime.
    /// Returns `true` if a bundle for `message_id` was found at all.
    pub fn confirm_tag_bundle(&mut self, message_id: u32, now: Instant) -> bool {
        match self.unconfirmed_tag_bundle.remove(&message_id) {
            Some((tags, created)) => {
                if now.duration_since(created) < OUTGOING_TAG_LIFETIME {
                    for tag in tags {
                        self.tags.push_back((tag, created));
                    }
                }
                true
            }
            None => false,
        }
    }

    /// Drop anything past its lifetime: live tags, unconfirmed bundles.
    /// Returns `false` once the session is left with nothing live and no
    /// bundle in flight, signalling the owner may discard it.
    pub fn cleanup_expired(&mut self, now: Instant) -> bool {
        self.tags.retain(|(_, created)| now.duration_since(*created) < OUTGOING_TAG_LIFETIME);
        self.unconfirmed_tag_bundle.retain(|_, (_, created)| now.duration_since(*created) < OUTGOING_TAG_LIFETIME);
        !self.tags.is_empty() || !self.unconfirmed_tag_bundle.is_empty()
    }

    pub fn mark_lease_set_submitted(&mut self, message_id: u32, now: Instant) {
        self.lease_set_update_status = LeaseSetUpdateStatus::Submitted;
        self.lease_set_update_msg_id = Some(message_id);
        self.lease_set_submission_time = Some(now);
    }

    pub fn mark_lease_set_confirmed(&mut self, message_id: u32) -> bool {
        if self.lease_set_update_msg_id == Some(message_id) {
            self.lease_set_update_status = LeaseSetUpdateStatus::UpToDate;
            true
        } else {
            false
        }
    }

    /// Re-offer the lease-set if it's been submitted long enough without
    /// confirmation that the remote likely never got it.
    pub fn reconsider_lease_set_submission(&mut self, now: Instant) {
        if self.lease_set_update_status == LeaseSetUpdateStatus::Submitted {
            if let Some(submitted_at) = self.lease_set_submission_time {
                if now.duration_since(submitted_at) >= LEASE_SET_CONFIRMATION_TIMEOUT {
                    self.lease_set_update_status = LeaseSetUpdateStatus::Updated;
                }
            }
        }
    }

    /// Decide whether this send should mint and offer a fresh tag batch,
    /// popping a tag (or falling back to the caller's ElGamal path) and
    /// performing the actual wrap. `payload` is the already-assembled
    /// garlic payload (clove bundle, certificate, messageID, expiration);
    /// `destination_public_key` is required only when no live tag remains.
    pub fn wrap_payload(
        &mut self,
        payload: &[u8],
        new_tags: Option<&[SessionTag]>,
        destination_public_key: Option<&PublicKey>,
        now: Instant,
    ) -> Result<Vec<u8>> {
        let (prefix, iv) = match self.pop_live_tag(now) {
            Some(tag) => {
                let iv = derive_iv(&tag);
                (tag.to_vec(), iv)
            }
            None => {
                let public_key = destination_public_key.ok_or(GarlicError::NoSession)?;
                let mut pre_iv = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut pre_iv);
                let mut plaintext = [0u8; elgamal::PLAINTEXT_SIZE];
                plaintext[..32].copy_from_slice(&self.session_key);
                plaintext[32..64].copy_from_slice(&pre_iv);
                rand::thread_rng().fill_bytes(&mut plaintext[64..]);
                let ciphertext = elgamal::encrypt(public_key, &plaintext);
                (ciphertext.to_vec(), derive_iv(&pre_iv))
            }
        };

        let aes_block = build_aes_block(payload, new_tags)?;
        let mut encrypted = aes_block;
        cbc_encrypt(&self.session_key, &iv, &mut encrypted)?;

        let mut out = Vec::with_capacity(4 + prefix.len() + encrypted.len());
        out.extend_from_slice(&((prefix.len() + encrypted.len()) as u32).to_be_bytes());
        out.extend_from_slice(&prefix);
        out.extend_from_slice(&encrypted);
        Ok(out)
    }

    /// Convenience wrapper: decide whether to mint tags this send, record
    /// the bundle if so, and wrap. Returns the wrapped bytes and the tags
    /// minted (empty if none were needed).
    pub fn wrap_payload_minting_if_needed(
        &mut self,
        message_id: u32,
        payload: &[u8],
        destination_public_key: Option<&PublicKey>,
        now: Instant,
    ) -> Result<(Vec<u8>, Vec<SessionTag>)> {
        let minted = if self.needs_new_tags(now) { self.mint_tags() } else { Vec::new() };
        let new_tags_ref = if minted.is_empty() { None } else { Some(minted.as_slice()) };
        let wrapped = self.wrap_payload(payload, new_tags_ref, destination_public_key, now)?;
        if !minted.is_empty() {
            self.record_unconfirmed_bundle(message_id, minted.clone(), now);
        }
        Ok((wrapped, minted))
    }
}

fn derive_iv(seed: &[u8]) -> [u8; 16] {
    let digest = Sha256::digest(seed);
    digest[..16].try_into().unwrap()
}

fn build_aes_block(payload: &[u8], new_tags: Option<&[SessionTag]>) -> Result<Vec<u8>> {
    let tags = new_tags.unwrap_or(&[]);
    let mut block = Vec::with_capacity(2 + tags.len() * 32 + 4 + 32 + 1 + payload.len());
    block.extend_from_slice(&(tags.len() as u16).to_be_bytes());
    for tag in tags {
        block.extend_from_slice(tag);
    }
    block.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    block.extend_from_slice(&Sha256::digest(payload));
    block.push(0); // flag: no additional session key in this block
    block.extend_from_slice(payload);
    let rem = block.len() % 16;
    if rem != 0 {
        block.resize(block.len() + (16 - rem), 0);
    }
    Ok(block)
}

/// Split a decrypted AES block back into any newly-offered tags and the
/// garlic payload, verifying the embedded payload hash.
pub fn parse_aes_block(block: &[u8]) -> Result<(Vec<SessionTag>, Vec<u8>)> {
    if block.len() < 2 {
        return Err(GarlicError::Malformed("AES block shorter than tag count".into()));
    }
    let tag_count = u16::from_be_bytes(block[0..2].try_into().unwrap()) as usize;
    let mut offset = 2;
    if block.len() < offset + tag_count * 32 {
        return Err(GarlicError::Malformed("AES block truncated mid-tag-list".into()));
    }
    let mut tags = Vec::with_capacity(tag_count);
    for _ in 0..tag_count {
        let mut tag = [0u8; 32];
        tag.copy_from_slice(&block[offset..offset + 32]);
        tags.push(tag);
        offset += 32;
    }

    if block.len() < offset + 4 + 32 + 1 {
        return Err(GarlicError::Malformed("AES block truncated before payload".into()));
    }
    let payload_size = u32::from_be_bytes(block[offset..offset + 4].try_into().unwrap()) as usize;
    offset += 4;
    let payload_hash = &block[offset..offset + 32];
    offset += 32;
    offset += 1; // flag byte: additional session key, not implemented

    if block.len() < offset + payload_size {
        return Err(GarlicError::Malformed("AES block shorter than declared payload size".into()));
    }
    let payload = &block[offset..offset + payload_size];
    if Sha256::digest(payload).as_slice() != payload_hash {
        return Err(GarlicError::BadPayloadHash);
    }

    Ok((tags, payload.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use garlicrouter_crypto::elgamal::generate_keypair;

    #[test]
    fn fresh_session_has_no_live_tags() {
        let session = GarlicSession::new(NUM_TAGS_CONNECTION, false);
        assert_eq!(session.remaining_live_tags(Instant::now()), 0);
        assert!(session.needs_new_tags(Instant::now()));
    }

    #[test]
    fn first_wrap_uses_elgamal_when_no_tags() {
        let (public_key, _) = generate_keypair();
        let mut session = GarlicSession::new(NUM_TAGS_CONNECTION, false);
        let now = Instant::now();
        let wrapped = session.wrap_payload(b"hello", None, Some(&public_key), now).unwrap();
        // length prefix(4) + 512-byte ElGamal block + at least the AES block header.
        assert!(wrapped.len() > 4 + elgamal::CIPHERTEXT_SIZE);
    }

    #[test]
    fn wrap_without_tag_or_destination_fails() {
        let mut session = GarlicSession::new(NUM_TAGS_CONNECTION, false);
        assert!(session.wrap_payload(b"x", None, None, Instant::now()).is_err());
    }

    #[test]
    fn minted_tags_are_recorded_as_unconfirmed_until_acked() {
        let (public_key, _) = generate_keypair();
        let mut session = GarlicSession::new(4, false);
        let now = Instant::now();
        let (_, minted) = session.wrap_payload_minting_if_needed(7, b"payload", Some(&public_key), now).unwrap();
        assert_eq!(minted.len(), 4);
        assert_eq!(session.remaining_live_tags(now), 0);
        assert!(session.confirm_tag_bundle(7, now));
        assert_eq!(session.remaining_live_tags(now), 4);
    }

    #[test]
    fn confirm_tag_bundle_is_idempotent_and_reports_miss() {
        let mut session = GarlicSession::new(4, false);
        assert!(!session.confirm_tag_bundle(999, Instant::now()));
    }

    #[test]
    fn one_shot_session_wraps_with_its_installed_tag() {
        let mut session = GarlicSession::one_shot([1u8; 32], [2u8; 32], Instant::now());
        let wrapped = session.wrap_payload(b"ack", None, None, Instant::now()).unwrap();
        assert!(wrapped.len() > 4 + 32);
    }

    #[test]
    fn aes_block_round_trips_through_parse() {
        let block = build_aes_block(b"clove bytes here", None).unwrap();
        let (tags, payload) = parse_aes_block(&block).unwrap();
        assert!(tags.is_empty());
        assert_eq!(payload, b"clove bytes here");
    }

    #[test]
    fn aes_block_carries_new_tags() {
        let new_tags = vec![[9u8; 32], [8u8; 32]];
        let block = build_aes_block(b"x", Some(&new_tags)).unwrap();
        let (tags, payload) = parse_aes_block(&block).unwrap();
        assert_eq!(tags, new_tags);
        assert_eq!(payload, b"x");
    }

    #[test]
    fn tampered_payload_hash_is_rejected() {
        let mut block = build_aes_block(b"clove bytes", None).unwrap();
        let tag_count_end = 2;
        block[tag_count_end] ^= 0xFF; // corrupts the payload-size field
        assert!(parse_aes_block(&block).is_err());
    }

    #[test]
    fn lease_set_resubmission_after_timeout() {
        let mut session = GarlicSession::new(4, true);
        let now = Instant::now();
        session.mark_lease_set_submitted(1, now);
        session.reconsider_lease_set_submission(now);
        assert_eq!(session.lease_set_update_status, LeaseSetUpdateStatus::Submitted);

        let later = now + LEASE_SET_CONFIRMATION_TIMEOUT;
        session.reconsider_lease_set_submission(later);
        assert_eq!(session.lease_set_update_status, LeaseSetUpdateStatus::Updated);
    }

    #[test]
    fn lease_set_confirmed_only_for_matching_message_id() {
        let mut session = GarlicSession::new(4, true);
        session.mark_lease_set_submitted(42, Instant::now());
        assert!(!session.mark_lease_set_confirmed(41));
        assert!(session.mark_lease_set_confirmed(42));
        assert_eq!(session.lease_set_update_status, LeaseSetUpdateStatus::UpToDate);
    }
}
