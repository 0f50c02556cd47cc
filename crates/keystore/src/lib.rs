//! Router identity persistence and filesystem path conventions shared by
//! the daemon and any tooling built against it.
//!
//! ## Features
//!
//! - Long-term router identity (ElGamal encryption keypair + Ed25519
//!   signing keypair) loading, generation, and on-disk persistence
//! - Cross-platform path expansion (`~`, environment variables)

mod keypair;
mod paths;

pub use keypair::{default_key_path, load_or_generate_router_keys, save_router_keys, KeystoreError, RouterKeys};
pub use paths::{default_config_dir, default_keystore_dir, expand_path};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("keystore error: {0}")]
    Keystore(#[from] KeystoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
