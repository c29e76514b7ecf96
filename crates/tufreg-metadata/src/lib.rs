//! Role-separated trust metadata
//!
//! This crate models the four-role signed metadata chain (root, targets,
//! snapshot, timestamp), its canonical signing form, document construction
//! on the publisher side, and the pure verification rules the consumer
//! applies: signature thresholds, expiration, version monotonicity, and
//! parent pins.
//!
//! Fetching and persistence live elsewhere; everything here operates on
//! in-memory documents so the rules can be tested in isolation.

pub mod builder;
pub mod canonical;
pub mod document;
pub mod error;
pub mod role;
pub mod verify;

pub use builder::{MetadataBuilder, RepositoryKeys};
pub use canonical::to_canonical_json;
pub use document::{
    BlobRef, KeySpec, MetaPin, Payload, RoleKeys, RootPayload, SignedMetadata, Signature,
    SnapshotPayload, TargetsPayload, TimestampPayload,
};
pub use error::{Error, Result};
pub use role::{Role, RoleLifetimes};
pub use verify::{check_monotonic, check_pin, TrustedRoot};
