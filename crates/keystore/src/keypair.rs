//! Long-term router identity: load a previously generated keypair off disk,
//! or generate and persist a fresh one on first run.

use crate::paths::default_keystore_dir;
use garlicrouter_crypto::elgamal::{self, PrivateKey, PublicKey};
use garlicrouter_crypto::identity::{RouterIdentity, SigningAlgorithm};
use garlicrouter_crypto::keys::EncryptionKeypair;
use garlicrouter_crypto::sign::SigningKeypair;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum KeystoreError {
    #[error("failed to read key file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to write key file {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },

    #[error("failed to create keystore directory {path}: {source}")]
    CreateDir { path: PathBuf, source: std::io::Error },

    #[error("key file {path} is the wrong size: expected {expected}, found {actual}")]
    WrongLength { path: PathBuf, expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, KeystoreError>;

const SIGNING_SECRET_SIZE: usize = 32;
const FILE_SIZE: usize = SIGNING_SECRET_SIZE + elgamal::KEY_SIZE + elgamal::KEY_SIZE;

/// A router's long-term identity plus the private material needed to sign
/// and decrypt under it.
#[derive(Clone)]
pub struct RouterKeys {
    pub identity: RouterIdentity,
    pub signing: SigningKeypair,
    pub encryption: EncryptionKeypair,
}

impl RouterKeys {
    fn generate() -> Self {
        let signing = SigningKeypair::generate();
        let encryption = EncryptionKeypair::generate();
        let identity = RouterIdentity::new(
            encryption.public_key.0,
            SigningAlgorithm::EdDsaSha512Ed25519,
            signing.public_key_bytes().to_vec(),
        )
        .expect("generated Ed25519 key matches its own declared length");
        Self { identity, signing, encryption }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FILE_SIZE);
        out.extend_from_slice(&self.signing.secret_key_bytes());
        out.extend_from_slice(&self.encryption.private_key.to_bytes());
        out.extend_from_slice(&self.encryption.public_key.0);
        out
    }

    fn from_bytes(bytes: &[u8], path: &Path) -> Result<Self> {
        if bytes.len() != FILE_SIZE {
            return Err(KeystoreError::WrongLength { path: path.to_path_buf(), expected: FILE_SIZE, actual: bytes.len() });
        }
        let signing = SigningKeypair::from_secret_bytes(&bytes[..SIGNING_SECRET_SIZE])
            .map_err(|_| KeystoreError::WrongLength { path: path.to_path_buf(), expected: SIGNING_SECRET_SIZE, actual: SIGNING_SECRET_SIZE })?;

        let mut encryption_private = [0u8; elgamal::KEY_SIZE];
        encryption_private.copy_from_slice(&bytes[SIGNING_SECRET_SIZE..SIGNING_SECRET_SIZE + elgamal::KEY_SIZE]);
        let private_key = PrivateKey::from_bytes(&encryption_private);

        let mut encryption_public = [0u8; elgamal::KEY_SIZE];
        encryption_public.copy_from_slice(&bytes[SIGNING_SECRET_SIZE + elgamal::KEY_SIZE..]);
        let public_key = PublicKey(encryption_public);

        let identity = RouterIdentity::new(encryption_public, SigningAlgorithm::EdDsaSha512Ed25519, signing.public_key_bytes().to_vec())
            .expect("stored Ed25519 key matches its own declared length");

        Ok(Self {
            identity,
            signing,
            encryption: EncryptionKeypair { public_key, private_key },
        })
    }
}

/// Default path a router instance's identity file lives at.
pub fn default_key_path() -> PathBuf {
    default_keystore_dir().join("router.keys")
}

/// Load the router identity at `path`, generating and persisting a fresh
/// one if nothing is there yet.
pub fn load_or_generate_router_keys(path: &Path) -> Result<RouterKeys> {
    if path.exists() {
        debug!(?path, "loading existing router identity");
        let bytes = fs::read(path).map_err(|source| KeystoreError::Read { path: path.to_path_buf(), source })?;
        return RouterKeys::from_bytes(&bytes, path);
    }

    info!(?path, "no router identity found, generating one");
    let keys = RouterKeys::generate();
    save_router_keys(path, &keys)?;
    Ok(keys)
}

/// Persist `keys` to `path`, creating the parent directory if needed.
pub fn save_router_keys(path: &Path, keys: &RouterKeys) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| KeystoreError::CreateDir { path: parent.to_path_buf(), source })?;
    }
    fs::write(path, keys.to_bytes()).map_err(|source| KeystoreError::Write { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn scratch_path() -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("garlicrouter-keystore-test-{}-{}.keys", std::process::id(), n))
    }

    #[test]
    fn generates_and_persists_on_first_run() {
        let path = scratch_path();
        let _ = fs::remove_file(&path);

        let keys = load_or_generate_router_keys(&path).unwrap();
        assert!(path.exists());
        assert_eq!(keys.identity.signing_key, keys.signing.public_key_bytes());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn reloads_the_same_identity() {
        let path = scratch_path();
        let _ = fs::remove_file(&path);

        let first = load_or_generate_router_keys(&path).unwrap();
        let second = load_or_generate_router_keys(&path).unwrap();
        assert_eq!(first.identity, second.identity);
        assert_eq!(first.signing.secret_key_bytes(), second.signing.secret_key_bytes());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn rejects_a_truncated_key_file() {
        let path = scratch_path();
        fs::write(&path, vec![0u8; 10]).unwrap();
        assert!(load_or_generate_router_keys(&path).is_err());
        let _ = fs::remove_file(&path);
    }
}
