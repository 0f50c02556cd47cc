use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetDbError {
    #[error("malformed NetDB record: {0}")]
    Malformed(String),

    #[error("signature does not verify")]
    BadSignature,

    #[error("lookup timed out")]
    Timeout,

    #[error("reply for unknown or expired lookup")]
    UnexpectedState,
}

pub type Result<T> = std::result::Result<T, NetDbError>;
