use thiserror::Error;

/// Error kinds shared across the router core. Each subsystem crate defines
/// its own richer error enum; this one covers failures that cut across all
/// of them (malformed wire data, signature checks, timeouts).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("signature does not verify")]
    BadSignature,

    #[error("operation timed out")]
    Timeout,

    #[error("size exceeds cap: {0}")]
    Overflow(String),

    #[error("reply for unknown or expired request")]
    UnexpectedState,

    #[error("cryptographic operation failed: {0}")]
    CryptoFailure(String),

    #[error("no reachable or compatible peer: {0}")]
    Unreachable(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_reason_text() {
        let err = CoreError::Malformed("short buffer".into());
        assert_eq!(err.to_string(), "malformed input: short buffer");
    }

    #[test]
    fn displays_overflow_and_unreachable() {
        assert_eq!(
            CoreError::Overflow("tunnel build record count".into()).to_string(),
            "size exceeds cap: tunnel build record count"
        );
        assert_eq!(
            CoreError::Unreachable("no floodfill peers known".into()).to_string(),
            "no reachable or compatible peer: no floodfill peers known"
        );
    }

    #[test]
    fn variants_are_comparable() {
        assert_eq!(CoreError::Timeout, CoreError::Timeout);
        assert_ne!(CoreError::Timeout, CoreError::BadSignature);
    }

    #[test]
    fn is_debug() {
        let debug_str = format!("{:?}", CoreError::Timeout);
        assert!(debug_str.contains("Timeout"));
    }

    #[test]
    fn result_type_ok_and_err() {
        let ok: Result<i32> = Ok(42);
        assert!(ok.is_ok());
        let err: Result<i32> = Err(CoreError::UnexpectedState);
        assert!(err.is_err());
    }
}
