// Store error taxonomy
use std::collections::TryReserveError;
use std::io;
use thiserror::Error;

/// Why a seek was rejected. The cursor is left where it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidSeek {
    #[error("command index {write_cmd} out of range ({live} live records)")]
    CommandOutOfRange { write_cmd: u32, live: usize },

    #[error("offset {offset} out of range for record {write_cmd} of {len} bytes")]
    OffsetOutOfRange { write_cmd: u32, offset: u32, len: usize },

    #[error("position {position} outside [0, {total}]")]
    PositionOutOfRange { position: i128, total: u64 },
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Growing the pending buffer failed, pending bytes are untouched
    #[error("allocation failed: {0}")]
    Allocation(#[from] TryReserveError),

    /// Copy into or out of a caller-supplied region could not complete
    #[error("transfer fault: {0}")]
    Transfer(#[source] io::Error),

    #[error("invalid seek: {0}")]
    InvalidSeek(#[from] InvalidSeek),

    /// Backing storage failed, the commit was not applied
    #[error("backing storage error: {0}")]
    Backing(#[source] io::Error),
}

impl From<StoreError> for io::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Allocation(e) => io::Error::new(io::ErrorKind::OutOfMemory, e),
            StoreError::InvalidSeek(e) => io::Error::new(io::ErrorKind::InvalidInput, e),
            StoreError::Transfer(e) | StoreError::Backing(e) => e,
        }
    }
}
