//! Error types for tufreg-store

use thiserror::Error;

use tufreg_crypto::Digest;

/// Errors surfaced by registry and auth collaborators
#[derive(Error, Debug)]
pub enum Error {
    /// The presented token (or lack of one) does not cover the operation
    #[error("unauthorized")]
    Unauthorized,

    /// A blob expected to exist is absent
    #[error("blob {0} not found")]
    BlobNotFound(Digest),

    /// A named metadata document expected to exist is absent
    #[error("metadata document {0} not found")]
    MetadataNotFound(String),

    /// Transport-level failure; the transport classifies transients
    #[error("transport error: {0}")]
    Transport(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, Error>;
