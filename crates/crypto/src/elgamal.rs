//! ElGamal encryption over the network's fixed 2048-bit prime. Used for
//! the tunnel build handshake and for the first garlic message sent to a
//! destination that has not yet handed out a session tag.

use crate::error::{CryptoError, Result};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Marshalled size of a public key, a private key, and one half of a
/// ciphertext block: all are 2048-bit (256-byte) big-endian integers.
pub const KEY_SIZE: usize = 256;
/// Total ciphertext size: two 256-byte integers `a` and `b`.
pub const CIPHERTEXT_SIZE: usize = KEY_SIZE * 2;
/// The fixed plaintext payload size this layer encrypts (the remainder of
/// the 256-byte cleartext block is the leading zero byte, a SHA-256 hash,
/// and one byte of random padding).
pub const PLAINTEXT_SIZE: usize = 222;

const GENERATOR: u64 = 2;

/// RFC 3526 MODP Group 14, the standard 2048-bit safe prime used as the
/// network's fixed ElGamal modulus.
const PRIME_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD",
    "129024E088A67CC74020BBEA63B139B22514A08798E3404",
    "DDEF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C",
    "245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B",
    "7EDEE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45",
    "B3DC2007CB8A163BF0598DA48361C55D39A69163FA8FD24C",
    "F5F83655D23DCA3AD961C62F356208552BB9ED529077096",
    "966D670C354E4ABC9804F1746C08CA18217C32905E462E3",
    "6CE3BE39E772C180E86039B2783A2EC07A28FB5C55DF06F",
    "4C52C9DE2BCBF6955817183995497CEA956AE515D226189",
    "8FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF",
);

fn prime() -> BigUint {
    BigUint::parse_bytes(PRIME_HEX.as_bytes(), 16).expect("fixed prime is valid hex")
}

fn generator() -> BigUint {
    BigUint::from(GENERATOR)
}

fn random_exponent(p: &BigUint) -> BigUint {
    let mut bytes = [0u8; KEY_SIZE];
    loop {
        rand::thread_rng().fill_bytes(&mut bytes);
        let candidate = BigUint::from_bytes_be(&bytes);
        if candidate > BigUint::one() && &candidate < p {
            return candidate;
        }
    }
}

fn to_fixed_bytes(value: &BigUint) -> [u8; KEY_SIZE] {
    let bytes = value.to_bytes_be();
    let mut out = [0u8; KEY_SIZE];
    assert!(bytes.len() <= KEY_SIZE);
    out[KEY_SIZE - bytes.len()..].copy_from_slice(&bytes);
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(pub [u8; KEY_SIZE]);

#[derive(Clone)]
pub struct PrivateKey(BigUint);

impl PrivateKey {
    pub fn to_bytes(&self) -> [u8; KEY_SIZE] {
        to_fixed_bytes(&self.0)
    }

    pub fn from_bytes(bytes: &[u8; KEY_SIZE]) -> Self {
        Self(BigUint::from_bytes_be(bytes))
    }
}

/// Generate a fresh ElGamal keypair: a uniform random exponent as the
/// private key, `g^x mod p` as the public key.
pub fn generate_keypair() -> (PublicKey, PrivateKey) {
    let p = prime();
    let x = random_exponent(&p);
    let y = generator().modpow(&x, &p);
    (PublicKey(to_fixed_bytes(&y)), PrivateKey(x))
}

/// Encrypt a fixed 222-byte plaintext block to `public_key`, producing a
/// 512-byte ciphertext (two concatenated 256-byte big-endian integers).
pub fn encrypt(public_key: &PublicKey, plaintext: &[u8; PLAINTEXT_SIZE]) -> [u8; CIPHERTEXT_SIZE] {
    let p = prime();
    let g = generator();
    let y = BigUint::from_bytes_be(&public_key.0);

    let mut cleartext = [0u8; KEY_SIZE];
    cleartext[0] = 0;
    let hash: [u8; 32] = Sha256::digest(plaintext).into();
    cleartext[1..33].copy_from_slice(&hash);
    cleartext[33..33 + PLAINTEXT_SIZE].copy_from_slice(plaintext);
    rand::thread_rng().fill_bytes(&mut cleartext[33 + PLAINTEXT_SIZE..]);

    let m = BigUint::from_bytes_be(&cleartext);
    let k = random_exponent(&p);
    let a = g.modpow(&k, &p);
    let b = (y.modpow(&k, &p) * &m) % &p;

    let mut out = [0u8; CIPHERTEXT_SIZE];
    out[..KEY_SIZE].copy_from_slice(&to_fixed_bytes(&a));
    out[KEY_SIZE..].copy_from_slice(&to_fixed_bytes(&b));
    out
}

/// Decrypt a 512-byte ciphertext block produced by [`encrypt`], recovering
/// the original 222-byte plaintext. Fails with `HashMismatch` if the
/// recovered cleartext's embedded hash doesn't match its payload — the
/// ciphertext was corrupted or encrypted to a different key.
pub fn decrypt(private_key: &PrivateKey, ciphertext: &[u8; CIPHERTEXT_SIZE]) -> Result<[u8; PLAINTEXT_SIZE]> {
    let p = prime();
    let a = BigUint::from_bytes_be(&ciphertext[..KEY_SIZE]);
    let b = BigUint::from_bytes_be(&ciphertext[KEY_SIZE..]);

    let s = a.modpow(&private_key.0, &p);
    let s_inv = mod_inverse(&s, &p).ok_or(CryptoError::AesFailure("non-invertible shared secret".into()))?;
    let m = (b * s_inv) % &p;

    let cleartext = to_fixed_bytes(&m);
    if cleartext[0] != 0 {
        return Err(CryptoError::HashMismatch);
    }
    let stored_hash = &cleartext[1..33];
    let payload: [u8; PLAINTEXT_SIZE] = cleartext[33..33 + PLAINTEXT_SIZE].try_into().unwrap();
    let computed_hash: [u8; 32] = Sha256::digest(payload).into();
    if stored_hash != computed_hash {
        return Err(CryptoError::HashMismatch);
    }
    Ok(payload)
}

fn mod_inverse(value: &BigUint, modulus: &BigUint) -> Option<BigUint> {
    if value.is_zero() {
        return None;
    }
    // Fermat's little theorem: modulus is prime, so value^(modulus-2) is the inverse.
    let exponent = modulus - BigUint::from(2u8);
    Some(value.modpow(&exponent, modulus))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plaintext(seed: u8) -> [u8; PLAINTEXT_SIZE] {
        [seed; PLAINTEXT_SIZE]
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let (pk, sk) = generate_keypair();
        let plaintext = sample_plaintext(42);
        let ciphertext = encrypt(&pk, &plaintext);
        let recovered = decrypt(&sk, &ciphertext).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn ciphertext_has_expected_size() {
        let (pk, _) = generate_keypair();
        let ciphertext = encrypt(&pk, &sample_plaintext(1));
        assert_eq!(ciphertext.len(), CIPHERTEXT_SIZE);
    }

    #[test]
    fn wrong_private_key_fails_to_decrypt() {
        let (pk, _) = generate_keypair();
        let (_, other_sk) = generate_keypair();
        let ciphertext = encrypt(&pk, &sample_plaintext(7));
        assert!(decrypt(&other_sk, &ciphertext).is_err());
    }

    #[test]
    fn corrupted_ciphertext_fails_to_decrypt() {
        let (pk, sk) = generate_keypair();
        let mut ciphertext = encrypt(&pk, &sample_plaintext(3));
        ciphertext[500] ^= 0xFF;
        assert!(decrypt(&sk, &ciphertext).is_err());
    }

    #[test]
    fn encryption_is_randomized() {
        let (pk, _) = generate_keypair();
        let plaintext = sample_plaintext(5);
        let c1 = encrypt(&pk, &plaintext);
        let c2 = encrypt(&pk, &plaintext);
        assert_ne!(c1, c2);
    }

    #[test]
    fn private_key_round_trips_through_bytes() {
        let (_, sk) = generate_keypair();
        let bytes = sk.to_bytes();
        let restored = PrivateKey::from_bytes(&bytes);
        assert_eq!(restored.to_bytes(), bytes);
    }
}
