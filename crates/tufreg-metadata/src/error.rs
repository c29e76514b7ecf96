//! Error types for tufreg-metadata
//!
//! The trust-chain variants each name the failing role and the reason, so
//! a rejected pull can be reported precisely.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::role::Role;

/// Errors that can occur while building or verifying metadata
#[derive(Error, Debug)]
pub enum Error {
    /// A signature from an authorized key failed cryptographic verification
    #[error("{role} metadata: bad signature from authorized key {keyid}")]
    BadSignature {
        /// The role whose document failed
        role: Role,
        /// The offending key id
        keyid: String,
    },

    /// Fewer valid signatures than the role's threshold requires
    #[error("{role} metadata: {valid} valid signature(s), threshold is {threshold}")]
    ThresholdNotMet {
        /// The role whose document failed
        role: Role,
        /// Number of valid signatures from distinct authorized keys
        valid: usize,
        /// Required threshold
        threshold: u32,
    },

    /// Document expiration is not in the future
    #[error("{role} metadata expired at {expires}")]
    Expired {
        /// The role whose document failed
        role: Role,
        /// The expiration carried by the document
        expires: DateTime<Utc>,
    },

    /// A fetched document is older than the trusted baseline (rollback attack)
    #[error("{role} metadata version {fetched} is older than trusted version {trusted}")]
    Rollback {
        /// The role whose document failed
        role: Role,
        /// Version in the trusted baseline
        trusted: u64,
        /// Version of the fetched document
        fetched: u64,
    },

    /// A document disagrees with the version/digest its parent pinned
    #[error("{role} metadata does not match its parent pin: {detail}")]
    InconsistentReference {
        /// The role whose document failed
        role: Role,
        /// What disagreed
        detail: String,
    },

    /// A pinned or referenced key is not present in the root document
    #[error("{role} role does not authorize key {keyid}")]
    UnknownKey {
        /// The role being verified
        role: Role,
        /// The missing key id
        keyid: String,
    },

    /// A role's declared threshold cannot be met by its key count
    #[error("{role} role threshold {threshold} cannot be met by {keys} key(s)")]
    InvalidThreshold {
        /// The role with the bad configuration
        role: Role,
        /// Declared threshold
        threshold: u32,
        /// Number of keys actually available
        keys: usize,
    },

    /// A document of the wrong role turned up where another was expected
    #[error("expected {expected} metadata, found {found}")]
    WrongRole {
        /// The role that was requested
        expected: Role,
        /// The role the document declares
        found: Role,
    },

    /// Metadata serialization error
    #[error("Metadata serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Crypto error
    #[error("Crypto error: {0}")]
    Crypto(#[from] tufreg_crypto::Error),
}

/// Result type for metadata operations
pub type Result<T> = std::result::Result<T, Error>;
