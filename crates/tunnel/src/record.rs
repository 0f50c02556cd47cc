//! TunnelBuildRecord: the 528-byte onion-wrapped per-hop build request, and
//! the 528-byte reply record each hop writes back in its place.

use crate::error::{Result, TunnelError};
use garlicrouter_crypto::elgamal::{self, PublicKey};
use rand::RngCore;
use sha2::{Digest, Sha256};

pub const RECORD_SIZE: usize = 528;
pub const TARGET_HASH_PREFIX_SIZE: usize = 16;
pub const ENCRYPTED_INNER_SIZE: usize = elgamal::CIPHERTEXT_SIZE;
pub const INNER_PLAINTEXT_SIZE: usize = elgamal::PLAINTEXT_SIZE;

/// Bit 7: this hop is the outbound tunnel's endpoint. Bit 6: this hop is
/// the inbound tunnel's gateway.
pub const FLAG_OUTBOUND_ENDPOINT: u8 = 0b1000_0000;
pub const FLAG_INBOUND_GATEWAY: u8 = 0b0100_0000;

/// One hop's plaintext instructions before ElGamal encryption to that hop's
/// public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecordFields {
    pub receive_tunnel: u32,
    pub local_ident: [u8; 32],
    pub next_tunnel: u32,
    pub next_ident: [u8; 32],
    pub layer_key: [u8; 32],
    pub iv_key: [u8; 32],
    pub reply_key: [u8; 32],
    pub reply_iv: [u8; 16],
    pub flags: u8,
    pub request_time_hours: u32,
    pub send_message_id: u32,
}

impl BuildRecordFields {
    pub fn is_outbound_endpoint(&self) -> bool {
        self.flags & FLAG_OUTBOUND_ENDPOINT != 0
    }

    pub fn is_inbound_gateway(&self) -> bool {
        self.flags & FLAG_INBOUND_GATEWAY != 0
    }

    /// Serialize into the 222-byte inner plaintext, padded with random
    /// bytes to fill the remainder.
    pub fn to_plaintext(&self) -> [u8; INNER_PLAINTEXT_SIZE] {
        let mut out = [0u8; INNER_PLAINTEXT_SIZE];
        let mut offset = 0;
        macro_rules! put {
            ($bytes:expr) => {{
                let bytes: &[u8] = $bytes;
                out[offset..offset + bytes.len()].copy_from_slice(bytes);
                offset += bytes.len();
            }};
        }
        put!(&self.receive_tunnel.to_be_bytes());
        put!(&self.local_ident);
        put!(&self.next_tunnel.to_be_bytes());
        put!(&self.next_ident);
        put!(&self.layer_key);
        put!(&self.iv_key);
        put!(&self.reply_key);
        put!(&self.reply_iv);
        put!(&[self.flags]);
        put!(&self.request_time_hours.to_be_bytes());
        put!(&self.send_message_id.to_be_bytes());
        rand::thread_rng().fill_bytes(&mut out[offset..]);
        out
    }

    pub fn from_plaintext(bytes: &[u8; INNER_PLAINTEXT_SIZE]) -> Result<Self> {
        let mut offset = 0;
        macro_rules! take {
            ($n:expr) => {{
                let slice = &bytes[offset..offset + $n];
                offset += $n;
                slice
            }};
        }
        let receive_tunnel = u32::from_be_bytes(take!(4).try_into().unwrap());
        let local_ident: [u8; 32] = take!(32).try_into().unwrap();
        let next_tunnel = u32::from_be_bytes(take!(4).try_into().unwrap());
        let next_ident: [u8; 32] = take!(32).try_into().unwrap();
        let layer_key: [u8; 32] = take!(32).try_into().unwrap();
        let iv_key: [u8; 32] = take!(32).try_into().unwrap();
        let reply_key: [u8; 32] = take!(32).try_into().unwrap();
        let reply_iv: [u8; 16] = take!(16).try_into().unwrap();
        let flags = take!(1)[0];
        let request_time_hours = u32::from_be_bytes(take!(4).try_into().unwrap());
        let send_message_id = u32::from_be_bytes(take!(4).try_into().unwrap());

        Ok(Self {
            receive_tunnel,
            local_ident,
            next_tunnel,
            next_ident,
            layer_key,
            iv_key,
            reply_key,
            reply_iv,
            flags,
            request_time_hours,
            send_message_id,
        })
    }
}

/// The 528-byte wire form sent to a hop: a 16-byte routing prefix (first 16
/// bytes of the hop's identity hash) plus the 512-byte ElGamal ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecord {
    pub target_hash_prefix: [u8; TARGET_HASH_PREFIX_SIZE],
    pub encrypted: [u8; ENCRYPTED_INNER_SIZE],
}

impl BuildRecord {
    pub fn encrypt(target_identity_hash: &[u8; 32], hop_public_key: &PublicKey, fields: &BuildRecordFields) -> Result<Self> {
        let plaintext = fields.to_plaintext();
        let encrypted = elgamal::encrypt(hop_public_key, &plaintext);
        let mut target_hash_prefix = [0u8; TARGET_HASH_PREFIX_SIZE];
        target_hash_prefix.copy_from_slice(&target_identity_hash[..TARGET_HASH_PREFIX_SIZE]);
        Ok(Self {
            target_hash_prefix,
            encrypted,
        })
    }

    pub fn decrypt(&self, private_key: &elgamal::PrivateKey) -> Result<BuildRecordFields> {
        let plaintext = elgamal::decrypt(private_key, &self.encrypted)?;
        BuildRecordFields::from_plaintext(&plaintext)
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        out[..TARGET_HASH_PREFIX_SIZE].copy_from_slice(&self.target_hash_prefix);
        out[TARGET_HASH_PREFIX_SIZE..].copy_from_slice(&self.encrypted);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != RECORD_SIZE {
            return Err(TunnelError::Malformed(format!("build record must be {RECORD_SIZE} bytes, got {}", bytes.len())));
        }
        let mut target_hash_prefix = [0u8; TARGET_HASH_PREFIX_SIZE];
        target_hash_prefix.copy_from_slice(&bytes[..TARGET_HASH_PREFIX_SIZE]);
        let mut encrypted = [0u8; ENCRYPTED_INNER_SIZE];
        encrypted.copy_from_slice(&bytes[TARGET_HASH_PREFIX_SIZE..]);
        Ok(Self {
            target_hash_prefix,
            encrypted,
        })
    }

    /// AES-CBC-re-encrypt the whole 528-byte record in place under a hop's
    /// reply-key, part of the onion pre-image walk during build-message
    /// assembly. Once this is applied the `target_hash_prefix`/`encrypted`
    /// split no longer carries meaning; it's just storage for 528 opaque
    /// bytes until the matching decrypt peels it back off.
    pub fn reply_encrypt_in_place(&mut self, reply_key: &[u8; 32], reply_iv: &[u8; 16]) -> Result<()> {
        let mut buf = self.to_bytes();
        garlicrouter_crypto::layered_aes::cbc_encrypt(reply_key, reply_iv, &mut buf)?;
        *self = Self::from_bytes(&buf)?;
        Ok(())
    }

    pub fn reply_decrypt_in_place(&mut self, reply_key: &[u8; 32], reply_iv: &[u8; 16]) -> Result<()> {
        let mut buf = self.to_bytes();
        garlicrouter_crypto::layered_aes::cbc_decrypt(reply_key, reply_iv, &mut buf)?;
        *self = Self::from_bytes(&buf)?;
        Ok(())
    }
}

/// A hop's acceptance/rejection status in a build reply. Any non-zero
/// value is policy-equivalent to rejected; the specific codes below are
/// retained for observability only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopStatus {
    Accepted,
    Rejected(u8),
}

impl HopStatus {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::Accepted,
            other => Self::Rejected(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Accepted => 0,
            Self::Rejected(code) => code,
        }
    }

    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Builds the 528-byte reply payload a hop writes in place of the original
/// record: `SHA-256(pad ‖ status) ‖ pad(495) ‖ status(1)`.
pub fn build_reply_payload(status: HopStatus) -> [u8; RECORD_SIZE] {
    let mut pad = [0u8; 495];
    rand::thread_rng().fill_bytes(&mut pad);
    let status_byte = status.to_byte();

    let mut hasher = Sha256::new();
    hasher.update(pad);
    hasher.update([status_byte]);
    let hash: [u8; 32] = hasher.finalize().into();

    let mut out = [0u8; RECORD_SIZE];
    out[..32].copy_from_slice(&hash);
    out[32..32 + 495].copy_from_slice(&pad);
    out[527] = status_byte;
    out
}

/// Recovers the status byte from a decrypted reply payload, verifying the
/// leading hash against the trailing pad+status.
pub fn read_reply_payload(bytes: &[u8; RECORD_SIZE]) -> Result<HopStatus> {
    let hash_claimed = &bytes[..32];
    let pad = &bytes[32..32 + 495];
    let status_byte = bytes[527];

    let mut hasher = Sha256::new();
    hasher.update(pad);
    hasher.update([status_byte]);
    let recomputed: [u8; 32] = hasher.finalize().into();

    if recomputed != hash_claimed {
        return Err(TunnelError::Malformed("build reply hash mismatch".into()));
    }
    Ok(HopStatus::from_byte(status_byte))
}

#[cfg(test)]
mod tests {
    use super::*;
    use garlicrouter_crypto::elgamal::generate_keypair;

    fn sample_fields() -> BuildRecordFields {
        BuildRecordFields {
            receive_tunnel: 42,
            local_ident: [1u8; 32],
            next_tunnel: 99,
            next_ident: [2u8; 32],
            layer_key: [3u8; 32],
            iv_key: [4u8; 32],
            reply_key: [5u8; 32],
            reply_iv: [6u8; 16],
            flags: FLAG_OUTBOUND_ENDPOINT,
            request_time_hours: 471_000,
            send_message_id: 7,
        }
    }

    #[test]
    fn plaintext_round_trip_preserves_fields() {
        let fields = sample_fields();
        let plaintext = fields.to_plaintext();
        let restored = BuildRecordFields::from_plaintext(&plaintext).unwrap();
        assert_eq!(restored, fields);
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let (public_key, private_key) = generate_keypair();
        let fields = sample_fields();
        let record = BuildRecord::encrypt(&[9u8; 32], &public_key, &fields).unwrap();
        let restored = record.decrypt(&private_key).unwrap();
        assert_eq!(restored, fields);
    }

    #[test]
    fn wire_round_trip() {
        let (public_key, _) = generate_keypair();
        let record = BuildRecord::encrypt(&[9u8; 32], &public_key, &sample_fields()).unwrap();
        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), RECORD_SIZE);
        let restored = BuildRecord::from_bytes(&bytes).unwrap();
        assert_eq!(restored, record);
    }

    #[test]
    fn wrong_size_bytes_rejected() {
        assert!(BuildRecord::from_bytes(&[0u8; 10]).is_err());
    }

    #[test]
    fn reply_encrypt_decrypt_round_trip() {
        let (public_key, _) = generate_keypair();
        let mut record = BuildRecord::encrypt(&[9u8; 32], &public_key, &sample_fields()).unwrap();
        let reply_key = [11u8; 32];
        let reply_iv = [12u8; 16];
        let original = record.encrypted;
        record.reply_encrypt_in_place(&reply_key, &reply_iv).unwrap();
        assert_ne!(record.encrypted, original);
        record.reply_decrypt_in_place(&reply_key, &reply_iv).unwrap();
        assert_eq!(record.encrypted, original);
    }

    #[test]
    fn flags_detect_roles() {
        let mut fields = sample_fields();
        fields.flags = FLAG_OUTBOUND_ENDPOINT;
        assert!(fields.is_outbound_endpoint());
        assert!(!fields.is_inbound_gateway());
        fields.flags = FLAG_INBOUND_GATEWAY;
        assert!(fields.is_inbound_gateway());
    }

    #[test]
    fn reply_payload_round_trip() {
        let payload = build_reply_payload(HopStatus::Accepted);
        let status = read_reply_payload(&payload).unwrap();
        assert!(status.is_accepted());
    }

    #[test]
    fn rejected_status_round_trips() {
        let payload = build_reply_payload(HopStatus::Rejected(30));
        let status = read_reply_payload(&payload).unwrap();
        assert_eq!(status, HopStatus::Rejected(30));
    }

    #[test]
    fn tampered_reply_payload_fails_verification() {
        let mut payload = build_reply_payload(HopStatus::Accepted);
        payload[40] ^= 0xFF;
        assert!(read_reply_payload(&payload).is_err());
    }
}
