//! Cryptographic primitives: long-term identities, Ed25519 signing,
//! ElGamal over the network's fixed 2048-bit prime, and the layered
//! AES-CBC scheme used by tunnels.

pub mod elgamal;
mod error;
pub mod identity;
pub mod keys;
pub mod layered_aes;
pub mod sign;

pub use error::{CryptoError, Result};
pub use identity::{RouterIdentity, SigningAlgorithm};
pub use keys::{EncryptionKeypair, KeypairPool};
pub use sign::SigningKeypair;
