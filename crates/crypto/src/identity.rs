//! Router identities: the long-term encryption + signing public key pair
//! that a router or destination is addressed by, and the 32-byte hash
//! derived from it.

use crate::error::{CryptoError, Result};
use sha2::{Digest, Sha256};

/// Size in bytes of the marshalled ElGamal public key carried in every
/// identity.
pub const ENCRYPTION_KEY_SIZE: usize = 256;

/// Size of the legacy signing-key field every identity reserves, regardless
/// of the actual signing algorithm's key size.
pub const LEGACY_SIGNING_FIELD_SIZE: usize = 128;

/// The closed set of signing algorithms a `RouterIdentity` may declare.
/// Only `EdDsaSha512Ed25519` has a working `sign`/`verify` implementation in
/// this router; the others round-trip through serialization so that
/// identities created by a peer using one of them can still be stored and
/// forwarded, but signature checks against them fail with
/// `CryptoError::UnsupportedAlgorithm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlgorithm {
    DsaSha1,
    EcdsaSha256P256,
    EcdsaSha384P384,
    EcdsaSha512P521,
    RsaSha2562048,
    RsaSha3843072,
    RsaSha5124096,
    EdDsaSha512Ed25519,
}

impl SigningAlgorithm {
    fn code(self) -> u16 {
        match self {
            Self::DsaSha1 => 0,
            Self::EcdsaSha256P256 => 1,
            Self::EcdsaSha384P384 => 2,
            Self::EcdsaSha512P521 => 3,
            Self::RsaSha2562048 => 4,
            Self::RsaSha3843072 => 5,
            Self::RsaSha5124096 => 6,
            Self::EdDsaSha512Ed25519 => 7,
        }
    }

    fn from_code(code: u16) -> Result<Self> {
        Ok(match code {
            0 => Self::DsaSha1,
            1 => Self::EcdsaSha256P256,
            2 => Self::EcdsaSha384P384,
            3 => Self::EcdsaSha512P521,
            4 => Self::RsaSha2562048,
            5 => Self::RsaSha3843072,
            6 => Self::RsaSha5124096,
            7 => Self::EdDsaSha512Ed25519,
            other => return Err(CryptoError::UnsupportedAlgorithm(format!("code {other}"))),
        })
    }

    /// Public key length for this algorithm, in bytes.
    pub fn pubkey_len(self) -> usize {
        match self {
            Self::DsaSha1 => 128,
            Self::EcdsaSha256P256 => 64,
            Self::EcdsaSha384P384 => 96,
            Self::EcdsaSha512P521 => 132,
            Self::RsaSha2562048 => 256,
            Self::RsaSha3843072 => 384,
            Self::RsaSha5124096 => 512,
            Self::EdDsaSha512Ed25519 => 32,
        }
    }
}

/// Certificate type byte: `NULL` carries no extension and is used whenever
/// the signing key fits entirely inside the legacy field; `KEY` carries the
/// declared algorithm (and any key-size overflow) and is used otherwise.
const CERT_TYPE_NULL: u8 = 0;
const CERT_TYPE_KEY: u8 = 5;

/// A router or destination's long-term identity: an ElGamal encryption
/// public key plus a signing public key of one of the closed-set
/// algorithms above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterIdentity {
    pub encryption_key: [u8; ENCRYPTION_KEY_SIZE],
    pub signing_algorithm: SigningAlgorithm,
    pub signing_key: Vec<u8>,
}

impl RouterIdentity {
    pub fn new(
        encryption_key: [u8; ENCRYPTION_KEY_SIZE],
        signing_algorithm: SigningAlgorithm,
        signing_key: Vec<u8>,
    ) -> Result<Self> {
        if signing_key.len() != signing_algorithm.pubkey_len() {
            return Err(CryptoError::WrongLength {
                expected: signing_algorithm.pubkey_len(),
                actual: signing_key.len(),
            });
        }
        Ok(Self {
            encryption_key,
            signing_algorithm,
            signing_key,
        })
    }

    /// SHA-256 of the full serialized identity. A pure function of the
    /// identity bytes: any two identities with the same hash are identical.
    pub fn identity_hash(&self) -> [u8; 32] {
        Sha256::digest(self.to_bytes()).into()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let sig_len = self.signing_algorithm.pubkey_len();
        let mut legacy_field = [0u8; LEGACY_SIGNING_FIELD_SIZE];

        // The default signing algorithm's key fits entirely inside the
        // legacy field, so it needs no certificate extension at all: a
        // NULL certificate keeps the identity at exactly
        // `ENCRYPTION_KEY_SIZE + LEGACY_SIGNING_FIELD_SIZE + 3` bytes.
        // Every other algorithm still needs a KEY certificate to name
        // itself, even when its key also happens to fit.
        if self.signing_algorithm == SigningAlgorithm::EdDsaSha512Ed25519 && sig_len <= LEGACY_SIGNING_FIELD_SIZE {
            legacy_field[..sig_len].copy_from_slice(&self.signing_key);

            let mut out = Vec::with_capacity(ENCRYPTION_KEY_SIZE + LEGACY_SIGNING_FIELD_SIZE + 3);
            out.extend_from_slice(&self.encryption_key);
            out.extend_from_slice(&legacy_field);
            out.push(CERT_TYPE_NULL);
            out.extend_from_slice(&0u16.to_be_bytes());
            return out;
        }

        let overflow: &[u8];
        if sig_len <= LEGACY_SIGNING_FIELD_SIZE {
            legacy_field[..sig_len].copy_from_slice(&self.signing_key);
            overflow = &[];
        } else {
            legacy_field.copy_from_slice(&self.signing_key[..LEGACY_SIGNING_FIELD_SIZE]);
            overflow = &self.signing_key[LEGACY_SIGNING_FIELD_SIZE..];
        }

        let mut cert_extra = Vec::with_capacity(4 + overflow.len());
        cert_extra.extend_from_slice(&self.signing_algorithm.code().to_be_bytes());
        cert_extra.extend_from_slice(&0u16.to_be_bytes()); // crypto type: ElGamal only
        cert_extra.extend_from_slice(overflow);

        let mut out = Vec::with_capacity(ENCRYPTION_KEY_SIZE + LEGACY_SIGNING_FIELD_SIZE + 3 + cert_extra.len());
        out.extend_from_slice(&self.encryption_key);
        out.extend_from_slice(&legacy_field);
        out.push(CERT_TYPE_KEY);
        out.extend_from_slice(&(cert_extra.len() as u16).to_be_bytes());
        out.extend_from_slice(&cert_extra);
        out
    }

    /// Number of bytes [`Self::from_bytes`] will consume from the start of
    /// `bytes`, without fully decoding the embedded certificate. Lets a
    /// caller that has an identity embedded inside a larger buffer (e.g. a
    /// `RouterInfo`) find where it ends.
    pub fn encoded_len(bytes: &[u8]) -> Result<usize> {
        let header_len = ENCRYPTION_KEY_SIZE + LEGACY_SIGNING_FIELD_SIZE + 3;
        if bytes.len() < header_len {
            return Err(CryptoError::WrongLength {
                expected: header_len,
                actual: bytes.len(),
            });
        }
        let cert_len = u16::from_be_bytes(bytes[header_len - 2..header_len].try_into().unwrap()) as usize;
        Ok(header_len + cert_len)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header_len = ENCRYPTION_KEY_SIZE + LEGACY_SIGNING_FIELD_SIZE + 3;
        if bytes.len() < header_len {
            return Err(CryptoError::WrongLength {
                expected: header_len,
                actual: bytes.len(),
            });
        }
        let mut encryption_key = [0u8; ENCRYPTION_KEY_SIZE];
        encryption_key.copy_from_slice(&bytes[0..ENCRYPTION_KEY_SIZE]);

        let legacy_field = &bytes[ENCRYPTION_KEY_SIZE..ENCRYPTION_KEY_SIZE + LEGACY_SIGNING_FIELD_SIZE];
        let cert_type = bytes[ENCRYPTION_KEY_SIZE + LEGACY_SIGNING_FIELD_SIZE];
        let cert_len = u16::from_be_bytes(
            bytes[header_len - 2..header_len]
                .try_into()
                .unwrap(),
        ) as usize;

        if cert_type == CERT_TYPE_NULL {
            if cert_len != 0 {
                return Err(CryptoError::UnsupportedAlgorithm("NULL certificate with nonzero length".into()));
            }
            let signing_algorithm = SigningAlgorithm::EdDsaSha512Ed25519;
            let signing_key = legacy_field[..signing_algorithm.pubkey_len()].to_vec();
            return Ok(Self {
                encryption_key,
                signing_algorithm,
                signing_key,
            });
        }
        if cert_type != CERT_TYPE_KEY {
            return Err(CryptoError::UnsupportedAlgorithm("unrecognised certificate type".into()));
        }
        if bytes.len() < header_len + cert_len || cert_len < 4 {
            return Err(CryptoError::WrongLength {
                expected: header_len + cert_len.max(4),
                actual: bytes.len(),
            });
        }
        let cert_extra = &bytes[header_len..header_len + cert_len];
        let sig_code = u16::from_be_bytes(cert_extra[0..2].try_into().unwrap());
        let signing_algorithm = SigningAlgorithm::from_code(sig_code)?;
        let overflow = &cert_extra[4..];

        let sig_len = signing_algorithm.pubkey_len();
        let mut signing_key = Vec::with_capacity(sig_len);
        if sig_len <= LEGACY_SIGNING_FIELD_SIZE {
            signing_key.extend_from_slice(&legacy_field[..sig_len]);
        } else {
            signing_key.extend_from_slice(legacy_field);
            signing_key.extend_from_slice(overflow);
            if signing_key.len() != sig_len {
                return Err(CryptoError::WrongLength {
                    expected: sig_len,
                    actual: signing_key.len(),
                });
            }
        }

        Ok(Self {
            encryption_key,
            signing_algorithm,
            signing_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ed25519_identity_round_trips_as_a_null_certificate() {
        let id = RouterIdentity::new([7u8; ENCRYPTION_KEY_SIZE], SigningAlgorithm::EdDsaSha512Ed25519, vec![9u8; 32]).unwrap();
        let bytes = id.to_bytes();
        assert_eq!(bytes.len(), ENCRYPTION_KEY_SIZE + LEGACY_SIGNING_FIELD_SIZE + 3);
        assert_eq!(bytes[ENCRYPTION_KEY_SIZE + LEGACY_SIGNING_FIELD_SIZE], CERT_TYPE_NULL);
        let restored = RouterIdentity::from_bytes(&bytes).unwrap();
        assert_eq!(restored, id);
    }

    #[test]
    fn small_non_default_key_still_uses_a_key_certificate() {
        // EcdsaSha256P256's 64-byte key fits the legacy field too, but only
        // the default algorithm gets the NULL-certificate shortcut — every
        // other algorithm still needs a certificate to name itself.
        let key = vec![1u8; SigningAlgorithm::EcdsaSha256P256.pubkey_len()];
        let id = RouterIdentity::new([5u8; ENCRYPTION_KEY_SIZE], SigningAlgorithm::EcdsaSha256P256, key.clone()).unwrap();
        let bytes = id.to_bytes();
        assert_eq!(bytes[ENCRYPTION_KEY_SIZE + LEGACY_SIGNING_FIELD_SIZE], CERT_TYPE_KEY);
        let restored = RouterIdentity::from_bytes(&bytes).unwrap();
        assert_eq!(restored, id);
    }

    #[test]
    fn encoded_len_matches_to_bytes_length() {
        let id = RouterIdentity::new([7u8; ENCRYPTION_KEY_SIZE], SigningAlgorithm::EdDsaSha512Ed25519, vec![9u8; 32]).unwrap();
        let bytes = id.to_bytes();
        assert_eq!(RouterIdentity::encoded_len(&bytes).unwrap(), bytes.len());

        let key = vec![3u8; SigningAlgorithm::RsaSha2562048.pubkey_len()];
        let rsa_id = RouterIdentity::new([4u8; ENCRYPTION_KEY_SIZE], SigningAlgorithm::RsaSha2562048, key).unwrap();
        let rsa_bytes = rsa_id.to_bytes();
        assert_eq!(RouterIdentity::encoded_len(&rsa_bytes).unwrap(), rsa_bytes.len());
    }

    #[test]
    fn identity_hash_is_pure_function_of_bytes() {
        let id = RouterIdentity::new([1u8; ENCRYPTION_KEY_SIZE], SigningAlgorithm::EdDsaSha512Ed25519, vec![2u8; 32]).unwrap();
        let h1 = id.identity_hash();
        let h2 = RouterIdentity::from_bytes(&id.to_bytes()).unwrap().identity_hash();
        assert_eq!(h1, h2);
    }

    #[test]
    fn overflowing_signing_key_round_trips() {
        let key = vec![3u8; SigningAlgorithm::RsaSha2562048.pubkey_len()];
        let id = RouterIdentity::new([4u8; ENCRYPTION_KEY_SIZE], SigningAlgorithm::RsaSha2562048, key.clone()).unwrap();
        let bytes = id.to_bytes();
        assert!(bytes.len() > ENCRYPTION_KEY_SIZE + LEGACY_SIGNING_FIELD_SIZE + 3 + 4);
        let restored = RouterIdentity::from_bytes(&bytes).unwrap();
        assert_eq!(restored.signing_key, key);
    }

    #[test]
    fn wrong_signing_key_length_is_rejected() {
        let err = RouterIdentity::new([0u8; ENCRYPTION_KEY_SIZE], SigningAlgorithm::EdDsaSha512Ed25519, vec![0u8; 10]).unwrap_err();
        assert_eq!(err, CryptoError::WrongLength { expected: 32, actual: 10 });
    }

    #[test]
    fn truncated_bytes_rejected() {
        assert!(RouterIdentity::from_bytes(&[0u8; 10]).is_err());
    }

    #[test]
    fn different_identities_hash_differently() {
        let a = RouterIdentity::new([1u8; ENCRYPTION_KEY_SIZE], SigningAlgorithm::EdDsaSha512Ed25519, vec![1u8; 32]).unwrap();
        let b = RouterIdentity::new([2u8; ENCRYPTION_KEY_SIZE], SigningAlgorithm::EdDsaSha512Ed25519, vec![1u8; 32]).unwrap();
        assert_ne!(a.identity_hash(), b.identity_hash());
    }
}
