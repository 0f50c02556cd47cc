//! Encryption keypair handling and the pre-generation pool that keeps a
//! handful of ready ElGamal keypairs off the handshake hot path.

use crate::elgamal::{self, PrivateKey, PublicKey};
use std::collections::VecDeque;

/// Default number of ready keypairs the pool tries to keep available.
pub const DEFAULT_POOL_SIZE: usize = 5;

#[derive(Clone)]
pub struct EncryptionKeypair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

impl EncryptionKeypair {
    pub fn generate() -> Self {
        let (public_key, private_key) = elgamal::generate_keypair();
        Self { public_key, private_key }
    }
}

/// A small ring of pre-generated keypairs. Generating a 2048-bit ElGamal
/// keypair does nontrivial modular exponentiation; pulling from a
/// pre-filled pool keeps that cost off of the tunnel-build and
/// first-garlic-message hot paths.
pub struct KeypairPool {
    target_size: usize,
    ready: VecDeque<EncryptionKeypair>,
}

impl KeypairPool {
    pub fn new(target_size: usize) -> Self {
        Self {
            target_size,
            ready: VecDeque::new(),
        }
    }

    /// Top the pool back up to its target size. Call this periodically
    /// from a maintenance tick rather than inline with a take().
    pub fn replenish(&mut self) {
        while self.ready.len() < self.target_size {
            self.ready.push_back(EncryptionKeypair::generate());
        }
    }

    /// Take a ready keypair, generating one on the spot if the pool is
    /// empty (never blocks the caller on an empty pool, just pays the
    /// generation cost inline that one time).
    pub fn take(&mut self) -> EncryptionKeypair {
        self.ready.pop_front().unwrap_or_else(EncryptionKeypair::generate)
    }

    pub fn len(&self) -> usize {
        self.ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }
}

impl Default for KeypairPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}
