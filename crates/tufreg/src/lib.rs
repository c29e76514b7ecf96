//! Signed-metadata artifact distribution over an untrusted blob registry
//!
//! tufreg distributes versioned, content-addressed artifacts ("targets")
//! from a single publisher ([`Master`]) to many read-only consumers
//! ([`Replica`], the "copy" side) through an untrusted registry. Trust
//! derives from a chain of signed metadata documents rooted in an
//! out-of-band-distributed root public key, with four separated signing
//! roles (root, targets, snapshot, timestamp) so that compromise of a
//! lower-trust key cannot forge root-level trust. Consumers detect
//! tampering, rollback, mix-and-match, and freeze attacks even against a
//! fully compromised registry.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tufreg::{Master, MemoryRegistry, Replica, RepositoryContext, TargetSource};
//!
//! # async fn example() -> Result<(), tufreg::Error> {
//! let registry = Arc::new(MemoryRegistry::new());
//!
//! // Publisher side
//! let ctx = RepositoryContext::new("/var/lib/tufreg", "app")?;
//! let mut master = Master::open(ctx.clone(), registry.clone())?;
//! master.create_root_key(None)?;
//! master.create_metadata_keys(None, None, None)?;
//! master.create_metadata(None, None, None, None).await?;
//! master
//!     .push_target("release", &[TargetSource::File("app.tar".into())], None)
//!     .await?;
//! master.push_metadata(None, None, None).await?;
//! let pinned = master.root_public_key_pem()?;
//!
//! // Consumer side, bootstrapped from the out-of-band pinned key
//! let replica = Replica::open(ctx, registry);
//! let diff = replica.pull_metadata(Some(pinned.as_str())).await?;
//! assert_eq!(diff.added, vec!["release".to_string()]);
//! for blob in replica.pull_target("release", None).await? {
//!     let bytes = blob.read_to_vec().await?;
//!     // bytes are verified against the trusted digest
//! }
//! # Ok(())
//! # }
//! ```

mod baseline;
pub mod error;
pub mod master;
pub mod repo;
pub mod replica;
pub mod stream;
mod verify;

pub use error::{Error, Result};
pub use master::{Master, TargetSource};
pub use repo::RepositoryContext;
pub use replica::{BlobFetch, Replica, TargetCheck};
pub use stream::VerifyingStream;
pub use verify::TargetDiff;

pub use tufreg_crypto::{Digest, PublicKeyPem};
pub use tufreg_metadata::{BlobRef, Role, RoleLifetimes};
pub use tufreg_store::{
    Action, AuthProvider, BearerToken, Credentials, MemoryAuth, MemoryRegistry, Progress, Registry,
};
