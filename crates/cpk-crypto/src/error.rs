use thiserror::Error;

/// Errors from key handling and envelope operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("invalid length for {what}: expected {expected}, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("key wrap failed")]
    WrapFailed,

    /// The private key does not match the wrapped copy, or the copy was
    /// tampered with.
    #[error("could not unwrap content key with the supplied private key")]
    UnwrapFailed,

    /// No wrapped copy of the content key is recorded for the principal.
    #[error("no wrapped content key for {0}")]
    NoWrappedKey(String),

    #[error("payload encryption failed")]
    EncryptFailed,

    #[error("payload authentication failed")]
    DecryptFailed,
}

pub type CryptoResult<T> = Result<T, CryptoError>;
