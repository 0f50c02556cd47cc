use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum I2npError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("payload checksum does not match")]
    BadChecksum,

    #[error("message size exceeds cap: {0}")]
    Overflow(String),

    #[error("unknown message type: {0}")]
    UnknownType(u8),
}

pub type Result<T> = std::result::Result<T, I2npError>;
