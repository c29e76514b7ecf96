//! Error types for tufreg
//!
//! Trust and digest failures are fatal for the operation that hit them and
//! are never retried internally: retrying against the same compromised or
//! stale source cannot help. Transport-level transients are classified by
//! the registry collaborator, not here.

use thiserror::Error;

use tufreg_crypto::Digest;
use tufreg_metadata::Role;

/// Errors that can occur in tufreg operations
#[derive(Error, Debug)]
pub enum Error {
    /// Auth failure, surfaced to the caller without retry
    #[error("unauthorized")]
    Unauthorized,

    /// The metadata chain failed verification; no partial trust committed
    #[error("trust chain rejected: {0}")]
    TrustChain(tufreg_metadata::Error),

    /// An expected metadata document is absent from the registry
    #[error("{0} metadata not found on registry")]
    MissingMetadata(Role),

    /// Streamed blob content disagrees with the trusted digest
    #[error("digest mismatch: expected {expected}, computed {actual}")]
    DigestMismatch {
        /// The digest recorded in trusted metadata
        expected: Digest,
        /// The digest computed over the received bytes
        actual: Digest,
    },

    /// Received byte count disagrees with the declared blob size
    #[error("blob {digest}: declared size {declared}, received {received} bytes")]
    SizeMismatch {
        /// The blob being pulled
        digest: Digest,
        /// Size declared in trusted metadata
        declared: u64,
        /// Bytes actually received
        received: u64,
    },

    /// A key that must not exist yet already does
    #[error("{0} key already exists for this repository")]
    KeyExists(Role),

    /// The root key must be created before dependent-role keys
    #[error("root key does not exist; run create_root_key first")]
    MissingRootKey,

    /// Publisher-side metadata has not been generated yet
    #[error("repository metadata has not been created; run create_metadata first")]
    MetadataNotCreated,

    /// Consumer-side trust baseline is empty
    #[error("no trusted metadata for this repository; run pull_metadata first")]
    NoTrustedMetadata,

    /// The named target is not in the relevant target set
    #[error("target {0} does not exist")]
    TargetNotFound(String),

    /// Input validation failure
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Another operation holds the repository lock
    #[error("repository is locked by another operation")]
    RepositoryLocked,

    /// Crypto error
    #[error("Crypto error: {0}")]
    Crypto(#[from] tufreg_crypto::Error),

    /// Registry collaborator error
    #[error("Registry error: {0}")]
    Registry(tufreg_store::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tufreg_metadata::Error> for Error {
    fn from(e: tufreg_metadata::Error) -> Self {
        use tufreg_metadata::Error as Metadata;
        match e {
            // Builder-side failures are not chain rejections
            Metadata::Serialization(e) => Error::Json(e),
            Metadata::Crypto(e) => Error::Crypto(e),
            other => Error::TrustChain(other),
        }
    }
}

impl From<tufreg_store::Error> for Error {
    fn from(e: tufreg_store::Error) -> Self {
        use tufreg_store::Error as Store;
        match e {
            Store::Unauthorized => Error::Unauthorized,
            Store::MetadataNotFound(name) => match Role::from_name(&name) {
                Some(role) => Error::MissingMetadata(role),
                None => Error::Registry(Store::MetadataNotFound(name)),
            },
            other => Error::Registry(other),
        }
    }
}

/// Result type for tufreg operations
pub type Result<T> = std::result::Result<T, Error>;
