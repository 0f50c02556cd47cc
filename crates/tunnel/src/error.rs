use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TunnelError {
    #[error("malformed tunnel wire data: {0}")]
    Malformed(String),

    #[error("operation timed out")]
    Timeout,

    #[error("size exceeds cap: {0}")]
    Overflow(String),

    #[error("reply for unknown or expired build")]
    UnexpectedState,

    #[error("cryptographic operation failed: {0}")]
    CryptoFailure(String),

    #[error("no compatible or reachable peer: {0}")]
    Unreachable(String),
}

pub type Result<T> = std::result::Result<T, TunnelError>;

impl From<garlicrouter_crypto::CryptoError> for TunnelError {
    fn from(e: garlicrouter_crypto::CryptoError) -> Self {
        TunnelError::CryptoFailure(e.to_string())
    }
}
