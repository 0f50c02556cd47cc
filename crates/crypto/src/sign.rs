//! EdDSA (Ed25519) signing: the one fully-implemented member of the
//! closed-set signing algorithms declared in `identity.rs`.

use crate::error::{CryptoError, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

/// A generated Ed25519 keypair, manually `Clone`-able since
/// `ed25519_dalek::SigningKey` doesn't derive it.
pub struct SigningKeypair {
    signing_key: SigningKey,
}

impl Clone for SigningKeypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

impl SigningKeypair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::WrongLength {
            expected: 32,
            actual: bytes.len(),
        })?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&arr),
        })
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn sign(&self, data: &[u8]) -> [u8; 64] {
        self.signing_key.sign(data).to_bytes()
    }
}

/// Verify a 64-byte Ed25519 signature over `data` against a 32-byte
/// public key.
pub fn verify(public_key: &[u8], data: &[u8], signature: &[u8]) -> Result<()> {
    let public_key: [u8; 32] = public_key.try_into().map_err(|_| CryptoError::WrongLength {
        expected: 32,
        actual: public_key.len(),
    })?;
    let signature_bytes: [u8; 64] = signature.try_into().map_err(|_| CryptoError::WrongLength {
        expected: 64,
        actual: signature.len(),
    })?;
    let verifying_key =
        VerifyingKey::from_bytes(&public_key).map_err(|_| CryptoError::BadSignature)?;
    let signature = Signature::from_bytes(&signature_bytes);
    verifying_key
        .verify(data, &signature)
        .map_err(|_| CryptoError::BadSignature)
}
