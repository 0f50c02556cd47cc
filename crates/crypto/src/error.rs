use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("key material has the wrong length: expected {expected}, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("signature does not verify")]
    BadSignature,

    #[error("ElGamal plaintext does not fit in the fixed block size")]
    PlaintextTooLarge,

    #[error("ElGamal decryption failed: payload hash mismatch")]
    HashMismatch,

    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("AES-CBC operation failed: {0}")]
    AesFailure(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
