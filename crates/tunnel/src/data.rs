//! C6: the 1028-byte TunnelDataMessage and its layered encryption.

use crate::error::{Result, TunnelError};
use garlicrouter_crypto::layered_aes::{self, BODY_SIZE};
use sha2::{Digest, Sha256};

pub const MESSAGE_SIZE: usize = 1028;
const TUNNEL_ID_SIZE: usize = 4;
const IV_SIZE: usize = 16;

/// A single 1028-byte tunnel data message as it appears on the wire:
/// `TunnelID(4) ‖ IV(16) ‖ encrypted body(1008)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelDataMessage {
    pub tunnel_id: u32,
    pub iv: [u8; IV_SIZE],
    pub body: [u8; BODY_SIZE],
}

impl TunnelDataMessage {
    pub fn to_bytes(&self) -> [u8; MESSAGE_SIZE] {
        let mut out = [0u8; MESSAGE_SIZE];
        out[..TUNNEL_ID_SIZE].copy_from_slice(&self.tunnel_id.to_be_bytes());
        out[TUNNEL_ID_SIZE..TUNNEL_ID_SIZE + IV_SIZE].copy_from_slice(&self.iv);
        out[TUNNEL_ID_SIZE + IV_SIZE..].copy_from_slice(&self.body);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != MESSAGE_SIZE {
            return Err(TunnelError::Malformed(format!(
                "tunnel data message must be {MESSAGE_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let tunnel_id = u32::from_be_bytes(bytes[..TUNNEL_ID_SIZE].try_into().unwrap());
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&bytes[TUNNEL_ID_SIZE..TUNNEL_ID_SIZE + IV_SIZE]);
        let mut body = [0u8; BODY_SIZE];
        body.copy_from_slice(&bytes[TUNNEL_ID_SIZE + IV_SIZE..]);
        Ok(Self { tunnel_id, iv, body })
    }

    /// Re-encrypt this hop's layer in place (participant/gateway side) and
    /// swap in the next hop's tunnel ID.
    pub fn forward_layer(&mut self, layer_key: &[u8; 32], iv_key: &[u8; 32], next_tunnel_id: u32) -> Result<()> {
        layered_aes::encrypt_layer(layer_key, iv_key, &mut self.iv, &mut self.body)?;
        self.tunnel_id = next_tunnel_id;
        Ok(())
    }

    /// Peel this hop's layer in place (used by the endpoint, which keeps
    /// peeling until the innermost plaintext body is exposed).
    pub fn peel_layer(&mut self, layer_key: &[u8; 32], iv_key: &[u8; 32]) -> Result<()> {
        layered_aes::decrypt_layer(layer_key, iv_key, &mut self.iv, &mut self.body)
            .map_err(TunnelError::from)
    }
}

/// Plaintext body layout after all layers are peeled: `checksum(4) ‖
/// zero(1) ‖ padding(non-zero, variable) ‖ 0x00 delimiter ‖ fragments`.
pub struct PlaintextBody {
    pub fragments: Vec<u8>,
}

impl PlaintextBody {
    /// Assemble a plaintext body of exactly [`BODY_SIZE`] bytes: checksum
    /// over `iv ‖ fragments`, a zero byte, non-zero random padding up to
    /// the delimiter, the 0x00 delimiter, then the fragment bytes.
    pub fn build(iv: &[u8; IV_SIZE], fragments: &[u8]) -> Result<[u8; BODY_SIZE]> {
        let overhead = 4 + 1 + 1; // checksum + zero byte + delimiter
        if fragments.len() > BODY_SIZE - overhead {
            return Err(TunnelError::Overflow("fragments exceed tunnel data body capacity".into()));
        }
        let padding_len = BODY_SIZE - overhead - fragments.len();

        let mut hasher = Sha256::new();
        hasher.update(iv);
        hasher.update(fragments);
        let checksum: [u8; 4] = hasher.finalize()[..4].try_into().unwrap();

        let mut out = [0u8; BODY_SIZE];
        out[..4].copy_from_slice(&checksum);
        // byte 4 is the mandated zero byte.
        let mut padding = vec![0u8; padding_len];
        fill_nonzero_random(&mut padding);
        out[5..5 + padding_len].copy_from_slice(&padding);
        out[5 + padding_len] = 0x00; // delimiter
        out[6 + padding_len..].copy_from_slice(fragments);
        Ok(out)
    }

    /// Parse a plaintext body: locate the 0x00 delimiter after the fixed
    /// checksum+zero prefix, verify the checksum, and return the fragment
    /// bytes that follow.
    pub fn parse(body: &[u8; BODY_SIZE], iv: &[u8; IV_SIZE]) -> Result<Self> {
        if body[4] != 0x00 {
            return Err(TunnelError::Malformed("tunnel data body missing mandated zero byte".into()));
        }
        let delimiter_pos = body[5..].iter().position(|&b| b == 0x00).map(|p| p + 5);
        let delimiter_pos = delimiter_pos.ok_or_else(|| TunnelError::Malformed("no delimiter found in tunnel data body".into()))?;
        let fragments = &body[delimiter_pos + 1..];

        let mut hasher = Sha256::new();
        hasher.update(iv);
        hasher.update(fragments);
        let computed: [u8; 4] = hasher.finalize()[..4].try_into().unwrap();
        if computed != body[..4] {
            return Err(TunnelError::Malformed("tunnel data checksum mismatch".into()));
        }

        Ok(Self {
            fragments: fragments.to_vec(),
        })
    }
}

fn fill_nonzero_random(buf: &mut [u8]) {
    use rand::RngCore;
    let mut rng = rand::thread_rng();
    rng.fill_bytes(buf);
    for byte in buf.iter_mut() {
        if *byte == 0 {
            *byte = 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message(tunnel_id: u32) -> TunnelDataMessage {
        TunnelDataMessage {
            tunnel_id,
            iv: [7u8; IV_SIZE],
            body: [9u8; BODY_SIZE],
        }
    }

    #[test]
    fn wire_round_trip() {
        let msg = sample_message(42);
        let bytes = msg.to_bytes();
        assert_eq!(bytes.len(), MESSAGE_SIZE);
        let restored = TunnelDataMessage::from_bytes(&bytes).unwrap();
        assert_eq!(restored, msg);
    }

    #[test]
    fn wrong_size_rejected() {
        assert!(TunnelDataMessage::from_bytes(&[0u8; 10]).is_err());
    }

    #[test]
    fn forward_and_peel_are_inverse() {
        let layer_key = [1u8; 32];
        let iv_key = [2u8; 32];
        let original = sample_message(1);

        let mut msg = original.clone();
        msg.forward_layer(&layer_key, &iv_key, 99).unwrap();
        assert_eq!(msg.tunnel_id, 99);
        assert_ne!(msg.body, original.body);

        msg.peel_layer(&layer_key, &iv_key).unwrap();
        assert_eq!(msg.body, original.body);
        assert_eq!(msg.iv, original.iv);
    }

    #[test]
    fn plaintext_body_round_trips_fragments() {
        let iv = [3u8; IV_SIZE];
        let fragments = b"hello tunnel fragment bytes".to_vec();
        let body = PlaintextBody::build(&iv, &fragments).unwrap();
        let parsed = PlaintextBody::parse(&body, &iv).unwrap();
        assert_eq!(parsed.fragments, fragments);
    }

    #[test]
    fn plaintext_body_rejects_tampered_checksum() {
        let iv = [4u8; IV_SIZE];
        let mut body = PlaintextBody::build(&iv, b"payload").unwrap();
        body[0] ^= 0xFF;
        assert!(PlaintextBody::parse(&body, &iv).is_err());
    }

    #[test]
    fn oversized_fragments_rejected() {
        let iv = [5u8; IV_SIZE];
        let fragments = vec![1u8; BODY_SIZE];
        assert!(PlaintextBody::build(&iv, &fragments).is_err());
    }
}
