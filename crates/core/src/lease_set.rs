//! Lease sets: how a destination publishes its current inbound tunnel
//! gateways to NetDB so that other routers can reach it without ever
//! learning which tunnel hop, if any, is actually colocated with it.

use crate::error::{CoreError, Result};
use crate::types::{Hash32, TunnelId};
use serde::{Deserialize, Serialize};

/// Size in bytes of a marshalled ElGamal public key, as published inside a
/// LeaseSet's encryption-key field.
pub const ENCRYPTION_KEY_SIZE: usize = 256;

/// Maximum validity window of a single lease, in seconds. Leases with a
/// longer remaining lifetime than this at construction time are rejected
/// by callers (NetDB itself only checks `end_date` against the current
/// time, not this bound).
pub const MAX_LEASE_LIFETIME_SECS: u64 = 600;

/// A single inbound tunnel gateway entry: the identity hash of the router
/// that serves as the tunnel's gateway, the tunnel ID registered with that
/// gateway, and the Unix timestamp (seconds) after which the lease must no
/// longer be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub tunnel_gateway: Hash32,
    pub tunnel_id: TunnelId,
    pub end_date: u64,
}

impl Lease {
    pub fn is_expired(&self, now_secs: u64) -> bool {
        now_secs >= self.end_date
    }
}

/// A destination's published set of inbound gateways, signed by the
/// destination's own signing key so that NetDB and recipients can verify
/// it was not tampered with in transit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseSet {
    /// Identity hash of the destination this lease set belongs to.
    pub destination: Hash32,
    /// Marshalled ElGamal public key used to encrypt garlic messages
    /// addressed to this destination.
    pub encryption_key: [u8; ENCRYPTION_KEY_SIZE],
    /// Inbound tunnel gateways, most-preferred first.
    pub leases: Vec<Lease>,
    /// Signature over the preceding fields, by the destination's signing
    /// key. Variable length: the signing algorithm is not fixed by NetDB.
    pub signature: Vec<u8>,
}

impl LeaseSet {
    pub fn new(destination: Hash32, encryption_key: [u8; ENCRYPTION_KEY_SIZE]) -> Self {
        Self {
            destination,
            encryption_key,
            leases: Vec::new(),
            signature: Vec::new(),
        }
    }

    /// Data covered by the signature: destination || encryption_key || leases.
    pub fn signable_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(32 + ENCRYPTION_KEY_SIZE + self.leases.len() * 44);
        data.extend_from_slice(&self.destination);
        data.extend_from_slice(&self.encryption_key);
        for lease in &self.leases {
            data.extend_from_slice(&lease.tunnel_gateway);
            data.extend_from_slice(&lease.tunnel_id.to_be_bytes());
            data.extend_from_slice(&lease.end_date.to_be_bytes());
        }
        data
    }

    /// True if every lease has expired as of `now_secs`.
    pub fn is_fully_expired(&self, now_secs: u64) -> bool {
        self.leases.iter().all(|l| l.is_expired(now_secs))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.destination);
        out.extend_from_slice(&self.encryption_key);
        out.push(self.leases.len() as u8);
        for lease in &self.leases {
            out.extend_from_slice(&lease.tunnel_gateway);
            out.extend_from_slice(&lease.tunnel_id.to_be_bytes());
            out.extend_from_slice(&lease.end_date.to_be_bytes());
        }
        out.extend_from_slice(&(self.signature.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.signature);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header_len = 32 + ENCRYPTION_KEY_SIZE + 1;
        if bytes.len() < header_len {
            return Err(CoreError::Malformed("lease set shorter than header".into()));
        }
        let mut destination = [0u8; 32];
        destination.copy_from_slice(&bytes[0..32]);
        let mut encryption_key = [0u8; ENCRYPTION_KEY_SIZE];
        encryption_key.copy_from_slice(&bytes[32..32 + ENCRYPTION_KEY_SIZE]);
        let num_leases = bytes[32 + ENCRYPTION_KEY_SIZE] as usize;

        let mut offset = header_len;
        let mut leases = Vec::with_capacity(num_leases);
        for _ in 0..num_leases {
            if bytes.len() < offset + 44 {
                return Err(CoreError::Malformed("lease set truncated mid-lease".into()));
            }
            let mut tunnel_gateway = [0u8; 32];
            tunnel_gateway.copy_from_slice(&bytes[offset..offset + 32]);
            let tunnel_id = u32::from_be_bytes(bytes[offset + 32..offset + 36].try_into().unwrap());
            let end_date = u64::from_be_bytes(bytes[offset + 36..offset + 44].try_into().unwrap());
            leases.push(Lease {
                tunnel_gateway,
                tunnel_id,
                end_date,
            });
            offset += 44;
        }

        if bytes.len() < offset + 2 {
            return Err(CoreError::Malformed("lease set missing signature length".into()));
        }
        let sig_len = u16::from_be_bytes(bytes[offset..offset + 2].try_into().unwrap()) as usize;
        offset += 2;
        if bytes.len() < offset + sig_len {
            return Err(CoreError::Malformed("lease set truncated signature".into()));
        }
        let signature = bytes[offset..offset + sig_len].to_vec();

        Ok(Self {
            destination,
            encryption_key,
            leases,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_lease(seed: u8) -> Lease {
        Lease {
            tunnel_gateway: [seed; 32],
            tunnel_id: seed as u32 + 1,
            end_date: 1_700_000_000 + seed as u64,
        }
    }

    #[test]
    fn new_lease_set_is_empty() {
        let ls = LeaseSet::new([1u8; 32], [2u8; ENCRYPTION_KEY_SIZE]);
        assert!(ls.leases.is_empty());
        assert!(ls.signature.is_empty());
    }

    #[test]
    fn round_trips_through_bytes() {
        let mut ls = LeaseSet::new([1u8; 32], [2u8; ENCRYPTION_KEY_SIZE]);
        ls.leases.push(sample_lease(10));
        ls.leases.push(sample_lease(20));
        ls.signature = vec![9u8; 64];

        let bytes = ls.to_bytes();
        let restored = LeaseSet::from_bytes(&bytes).unwrap();
        assert_eq!(restored, ls);
    }

    #[test]
    fn empty_lease_set_round_trips() {
        let ls = LeaseSet::new([0u8; 32], [0u8; ENCRYPTION_KEY_SIZE]);
        let bytes = ls.to_bytes();
        let restored = LeaseSet::from_bytes(&bytes).unwrap();
        assert!(restored.leases.is_empty());
    }

    #[test]
    fn truncated_header_is_rejected() {
        let err = LeaseSet::from_bytes(&[0u8; 10]).unwrap_err();
        assert_eq!(err, CoreError::Malformed("lease set shorter than header".into()));
    }

    #[test]
    fn truncated_mid_lease_is_rejected() {
        let mut ls = LeaseSet::new([1u8; 32], [2u8; ENCRYPTION_KEY_SIZE]);
        ls.leases.push(sample_lease(1));
        let mut bytes = ls.to_bytes();
        bytes.truncate(bytes.len() - 20);
        assert!(LeaseSet::from_bytes(&bytes).is_err());
    }

    #[test]
    fn truncated_signature_is_rejected() {
        let mut ls = LeaseSet::new([1u8; 32], [2u8; ENCRYPTION_KEY_SIZE]);
        ls.signature = vec![1u8; 64];
        let mut bytes = ls.to_bytes();
        bytes.truncate(bytes.len() - 10);
        assert!(LeaseSet::from_bytes(&bytes).is_err());
    }

    #[test]
    fn lease_expiry() {
        let lease = sample_lease(5);
        assert!(!lease.is_expired(lease.end_date - 1));
        assert!(lease.is_expired(lease.end_date));
    }

    #[test]
    fn fully_expired_requires_all_leases_expired() {
        let mut ls = LeaseSet::new([1u8; 32], [0u8; ENCRYPTION_KEY_SIZE]);
        ls.leases.push(Lease {
            tunnel_gateway: [1u8; 32],
            tunnel_id: 1,
            end_date: 100,
        });
        ls.leases.push(Lease {
            tunnel_gateway: [2u8; 32],
            tunnel_id: 2,
            end_date: 200,
        });
        assert!(!ls.is_fully_expired(150));
        assert!(ls.is_fully_expired(200));
    }

    #[test]
    fn signable_data_changes_with_leases() {
        let mut ls = LeaseSet::new([1u8; 32], [2u8; ENCRYPTION_KEY_SIZE]);
        let before = ls.signable_data();
        ls.leases.push(sample_lease(1));
        let after = ls.signable_data();
        assert_ne!(before, after);
    }
}
