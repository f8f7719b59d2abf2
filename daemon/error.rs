// Error types for sessions (contained) and service setup (fatal)
use aesd_buffer::StoreError;
use aesd_core::ProtocolError;
use std::io;
use thiserror::Error;

/// Faults that end one connection and nothing else
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Listener could not be set up, nothing was accepted
    #[error("failed to listen on {address}: {source}")]
    Setup {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
