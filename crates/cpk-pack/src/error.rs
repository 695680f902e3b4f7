use cpk_types::Oid;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PackError {
    #[error("invalid pack magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    #[error("pack checksum mismatch")]
    ChecksumMismatch,

    #[error("corrupt pack entry at offset {offset}: {reason}")]
    CorruptEntry { offset: u64, reason: String },

    #[error("CRC32 mismatch for object {oid}")]
    CrcMismatch { oid: Oid },

    #[error("object count mismatch: header says {expected}, found {actual}")]
    CountMismatch { expected: u32, actual: u32 },

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("delta base not found: {0}")]
    DeltaBaseNotFound(Oid),

    #[error("invalid delta: {0}")]
    InvalidDelta(String),

    #[error("cannot split into packs of {0} objects")]
    InvalidSplit(usize),
}

pub type PackResult<T> = Result<T, PackError>;
