use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GarlicError {
    #[error("malformed garlic wire data: {0}")]
    Malformed(String),

    #[error("payload hash does not verify")]
    BadPayloadHash,

    #[error("no live session tag and no destination to ElGamal-encrypt to")]
    NoSession,

    #[error("cryptographic operation failed: {0}")]
    CryptoFailure(String),
}

pub type Result<T> = std::result::Result<T, GarlicError>;

impl From<garlicrouter_crypto::CryptoError> for GarlicError {
    fn from(e: garlicrouter_crypto::CryptoError) -> Self {
        GarlicError::CryptoFailure(e.to_string())
    }
}

impl From<garlicrouter_i2np::I2npError> for GarlicError {
    fn from(e: garlicrouter_i2np::I2npError) -> Self {
        GarlicError::Malformed(e.to_string())
    }
}
