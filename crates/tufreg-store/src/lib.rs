//! Collaborator contracts for tufreg
//!
//! The trust engine talks to the outside world through three contracts:
//!
//! - [`Registry`]: an untrusted blob store addressed by content digest,
//!   plus named storage for metadata documents. Nothing fetched through it
//!   is trusted until the metadata chain has verified it.
//! - [`AuthProvider`]: exchanges credentials for a scoped bearer token.
//! - [`Progress`]: an observer invoked per transferred chunk.
//!
//! [`MemoryRegistry`] is an in-process implementation used by tests and
//! local tooling.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use tufreg_store::{chunk_stream, MemoryRegistry, Registry};
//! use tufreg_crypto::Digest;
//!
//! # async fn example() -> Result<(), tufreg_store::Error> {
//! let registry = MemoryRegistry::new();
//! let digest = Digest::of(b"abc");
//!
//! registry
//!     .put_blob(digest, chunk_stream(Bytes::from_static(b"abc")))
//!     .await?;
//! assert!(registry.has_blob(digest).await?);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod error;
pub mod memory;
pub mod progress;

pub use auth::{Action, AuthProvider, BearerToken, Credentials, MemoryAuth};
pub use error::{Error, Result};
pub use memory::MemoryRegistry;
pub use progress::Progress;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream;
use futures_util::Stream;

use tufreg_crypto::Digest;

/// A boxed future in the style used throughout the collaborator traits
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A lazy, finite, non-restartable sequence of byte chunks for one blob
pub type BlobChunks = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Wrap a single buffer as a one-chunk stream
pub fn chunk_stream(bytes: Bytes) -> BlobChunks {
    let chunks: [Result<Bytes>; 1] = [Ok(bytes)];
    Box::pin(stream::iter(chunks))
}

/// The untrusted registry collaborator
///
/// Blobs are addressed solely by content digest; metadata documents are
/// stored under their role name. Implementations carry whatever bearer
/// token the caller supplied and surface [`Error::Unauthorized`] when it
/// does not cover an operation.
pub trait Registry: Send + Sync {
    /// Store a blob under its digest
    ///
    /// The registry does not verify the digest; the consumer re-verifies
    /// content on pull.
    fn put_blob(&self, digest: Digest, chunks: BlobChunks) -> BoxFuture<'_, Result<()>>;

    /// Fetch a blob's chunk stream by digest
    fn get_blob(&self, digest: Digest) -> BoxFuture<'_, Result<BlobChunks>>;

    /// Delete a blob by digest
    fn delete_blob(&self, digest: Digest) -> BoxFuture<'_, Result<()>>;

    /// Whether a blob with this digest is present
    fn has_blob(&self, digest: Digest) -> BoxFuture<'_, Result<bool>>;

    /// Store a named metadata document
    fn put_metadata<'a>(&'a self, name: &'a str, bytes: &'a [u8]) -> BoxFuture<'a, Result<()>>;

    /// Fetch a named metadata document
    fn get_metadata<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<u8>>>;
}

impl<T: Registry + ?Sized> Registry for Arc<T> {
    fn put_blob(&self, digest: Digest, chunks: BlobChunks) -> BoxFuture<'_, Result<()>> {
        (**self).put_blob(digest, chunks)
    }

    fn get_blob(&self, digest: Digest) -> BoxFuture<'_, Result<BlobChunks>> {
        (**self).get_blob(digest)
    }

    fn delete_blob(&self, digest: Digest) -> BoxFuture<'_, Result<()>> {
        (**self).delete_blob(digest)
    }

    fn has_blob(&self, digest: Digest) -> BoxFuture<'_, Result<bool>> {
        (**self).has_blob(digest)
    }

    fn put_metadata<'a>(&'a self, name: &'a str, bytes: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        (**self).put_metadata(name, bytes)
    }

    fn get_metadata<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        (**self).get_metadata(name)
    }
}
