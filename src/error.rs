use thiserror::Error;

/// Errors produced by the codec and the archive reader/writer.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Compression failed: {0}")]
    CompressionFailed(String),

    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("Member not found: {0}")]
    MemberNotFound(String),

    #[error("Invalid archive format: {0}")]
    InvalidFormat(String),

    #[error("Insufficient memory: could not allocate {0} bytes")]
    InsufficientMemory(usize),

    #[error("Duplicate member name: {0}")]
    DuplicateMember(String),

    #[error("Invalid member name: {0:?}")]
    InvalidMemberName(String),
}

impl ArchiveError {
    /// Whether the archive bytes themselves could not be made sense of.
    ///
    /// These are the failures a user sees as "archive unreadable" and the
    /// ones for which the storage facade may fall back to the raw bytes.
    pub fn is_unreadable(&self) -> bool {
        matches!(
            self,
            ArchiveError::MemberNotFound(_)
                | ArchiveError::InvalidFormat(_)
                | ArchiveError::DecompressionFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
