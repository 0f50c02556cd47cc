//! RouterInfo: a peer descriptor as stored and served by NetDB.

use crate::error::{NetDbError, Result};
use garlicrouter_core::{CapabilityFlags, PeerAddress};
use garlicrouter_crypto::identity::RouterIdentity;
use garlicrouter_crypto::sign;
use std::collections::BTreeMap;

/// Key under which the capability string lives in a RouterInfo's options
/// map, matching the original router's `"caps"` convention.
pub const CAPS_OPTION_KEY: &str = "caps";

#[derive(Debug, Clone, PartialEq)]
pub struct RouterInfo {
    pub identity: RouterIdentity,
    pub timestamp: u64,
    pub addresses: Vec<PeerAddress>,
    pub options: BTreeMap<String, String>,
    pub signature: Vec<u8>,
}

impl RouterInfo {
    pub fn new(identity: RouterIdentity, timestamp: u64, addresses: Vec<PeerAddress>) -> Self {
        Self {
            identity,
            timestamp,
            addresses,
            options: BTreeMap::new(),
            signature: Vec::new(),
        }
    }

    pub fn identity_hash(&self) -> [u8; 32] {
        self.identity.identity_hash()
    }

    pub fn capabilities(&self) -> CapabilityFlags {
        self.options
            .get(CAPS_OPTION_KEY)
            .map(|s| CapabilityFlags::parse(s))
            .unwrap_or_else(CapabilityFlags::empty)
    }

    pub fn set_capabilities(&mut self, flags: CapabilityFlags) {
        self.options.insert(CAPS_OPTION_KEY.to_string(), flags.to_caps_string());
    }

    pub fn is_floodfill(&self) -> bool {
        self.capabilities().contains(CapabilityFlags::FLOODFILL)
    }

    /// Bytes covered by the signature: identity ‖ timestamp ‖ addresses ‖
    /// options.
    pub fn signable_data(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.identity.to_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());

        out.push(self.addresses.len() as u8);
        for addr in &self.addresses {
            out.extend_from_slice(&addr.encode());
        }

        out.extend_from_slice(&(self.options.len() as u16).to_be_bytes());
        for (key, value) in &self.options {
            out.push(key.len() as u8);
            out.extend_from_slice(key.as_bytes());
            out.extend_from_slice(&(value.len() as u16).to_be_bytes());
            out.extend_from_slice(value.as_bytes());
        }
        out
    }

    /// Full wire form a DatabaseStore message carries: `signable_data() ‖
    /// signature_len(2) ‖ signature`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.signable_data();
        out.extend_from_slice(&(self.signature.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.signature);
        out
    }

    /// Parse a `RouterInfo` previously produced by [`Self::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let identity_len = RouterIdentity::encoded_len(bytes)
            .map_err(|_| NetDbError::Malformed("router info: bad identity header".into()))?;
        if bytes.len() < identity_len {
            return Err(NetDbError::Malformed("router info shorter than identity".into()));
        }
        let identity = RouterIdentity::from_bytes(&bytes[..identity_len])
            .map_err(|_| NetDbError::Malformed("router info: bad identity".into()))?;
        let mut offset = identity_len;

        if bytes.len() < offset + 8 {
            return Err(NetDbError::Malformed("router info missing timestamp".into()));
        }
        let timestamp = u64::from_be_bytes(bytes[offset..offset + 8].try_into().unwrap());
        offset += 8;

        if bytes.len() < offset + 1 {
            return Err(NetDbError::Malformed("router info missing address count".into()));
        }
        let addr_count = bytes[offset] as usize;
        offset += 1;

        let mut addresses = Vec::with_capacity(addr_count);
        for _ in 0..addr_count {
            let (addr, consumed) =
                PeerAddress::parse(&bytes[offset..]).map_err(|e| NetDbError::Malformed(e.to_string()))?;
            addresses.push(addr);
            offset += consumed;
        }

        if bytes.len() < offset + 2 {
            return Err(NetDbError::Malformed("router info missing option count".into()));
        }
        let option_count = u16::from_be_bytes(bytes[offset..offset + 2].try_into().unwrap()) as usize;
        offset += 2;

        let mut options = BTreeMap::new();
        for _ in 0..option_count {
            if bytes.len() < offset + 1 {
                return Err(NetDbError::Malformed("router info option key truncated".into()));
            }
            let key_len = bytes[offset] as usize;
            offset += 1;
            if bytes.len() < offset + key_len + 2 {
                return Err(NetDbError::Malformed("router info option truncated".into()));
            }
            let key = String::from_utf8_lossy(&bytes[offset..offset + key_len]).into_owned();
            offset += key_len;
            let value_len = u16::from_be_bytes(bytes[offset..offset + 2].try_into().unwrap()) as usize;
            offset += 2;
            if bytes.len() < offset + value_len {
                return Err(NetDbError::Malformed("router info option value truncated".into()));
            }
            let value = String::from_utf8_lossy(&bytes[offset..offset + value_len]).into_owned();
            offset += value_len;
            options.insert(key, value);
        }

        if bytes.len() < offset + 2 {
            return Err(NetDbError::Malformed("router info missing signature length".into()));
        }
        let sig_len = u16::from_be_bytes(bytes[offset..offset + 2].try_into().unwrap()) as usize;
        offset += 2;
        if bytes.len() < offset + sig_len {
            return Err(NetDbError::Malformed("router info truncated signature".into()));
        }
        let signature = bytes[offset..offset + sig_len].to_vec();

        Ok(Self {
            identity,
            timestamp,
            addresses,
            options,
            signature,
        })
    }

    pub fn sign(&mut self, keypair: &garlicrouter_crypto::sign::SigningKeypair) {
        let data = self.signable_data();
        self.signature = keypair.sign(&data).to_vec();
    }

    /// Verify the signature against the embedded identity's signing key.
    /// Only `EdDsaSha512Ed25519` identities can actually be checked; any
    /// other declared algorithm is treated as unverifiable and rejected,
    /// matching the router's single-algorithm deployment.
    pub fn verify_signature(&self) -> Result<()> {
        if self.identity.signing_algorithm != garlicrouter_crypto::identity::SigningAlgorithm::EdDsaSha512Ed25519 {
            return Err(NetDbError::BadSignature);
        }
        sign::verify(&self.identity.signing_key, &self.signable_data(), &self.signature)
            .map_err(|_| NetDbError::BadSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garlicrouter_crypto::identity::SigningAlgorithm;
    use garlicrouter_crypto::sign::SigningKeypair;

    fn sample_identity(keypair: &SigningKeypair) -> RouterIdentity {
        RouterIdentity::new(
            [5u8; 256],
            SigningAlgorithm::EdDsaSha512Ed25519,
            keypair.public_key_bytes().to_vec(),
        )
        .unwrap()
    }

    #[test]
    fn signed_router_info_verifies() {
        let keypair = SigningKeypair::generate();
        let mut info = RouterInfo::new(sample_identity(&keypair), 1000, vec![]);
        info.sign(&keypair);
        info.verify_signature().unwrap();
    }

    #[test]
    fn tampered_router_info_fails_verification() {
        let keypair = SigningKeypair::generate();
        let mut info = RouterInfo::new(sample_identity(&keypair), 1000, vec![]);
        info.sign(&keypair);
        info.timestamp += 1;
        assert!(info.verify_signature().is_err());
    }

    #[test]
    fn capability_round_trip() {
        let keypair = SigningKeypair::generate();
        let mut info = RouterInfo::new(sample_identity(&keypair), 1000, vec![]);
        info.set_capabilities(CapabilityFlags::FLOODFILL | CapabilityFlags::REACHABLE);
        assert!(info.is_floodfill());
        assert!(info.capabilities().contains(CapabilityFlags::REACHABLE));
    }

    #[test]
    fn no_caps_option_means_no_capabilities() {
        let keypair = SigningKeypair::generate();
        let info = RouterInfo::new(sample_identity(&keypair), 1000, vec![]);
        assert_eq!(info.capabilities(), CapabilityFlags::empty());
        assert!(!info.is_floodfill());
    }

    #[test]
    fn addresses_feed_signable_data() {
        let keypair = SigningKeypair::generate();
        let mut info = RouterInfo::new(sample_identity(&keypair), 1000, vec![]);
        let without = info.signable_data();
        info.addresses.push(PeerAddress {
            transport_style: "NTCP2".into(),
            host: "203.0.113.1".into(),
            port: 4444,
            cost: 10,
            mtu: None,
            introducers: None,
            intro_key: None,
        });
        let with = info.signable_data();
        assert_ne!(without, with);
    }

    #[test]
    fn router_info_wire_round_trip() {
        let keypair = SigningKeypair::generate();
        let mut info = RouterInfo::new(
            sample_identity(&keypair),
            1000,
            vec![PeerAddress {
                transport_style: "NTCP2".into(),
                host: "203.0.113.1".into(),
                port: 4444,
                cost: 10,
                mtu: None,
                introducers: None,
                intro_key: None,
            }],
        );
        info.set_capabilities(CapabilityFlags::FLOODFILL);
        info.sign(&keypair);

        let bytes = info.to_bytes();
        let restored = RouterInfo::from_bytes(&bytes).unwrap();
        assert_eq!(restored, info);
        restored.verify_signature().unwrap();
    }
}
