//! In-memory registry implementation
//!
//! Holds blobs and metadata documents in process memory. Used by the test
//! suites and by local tooling that wants a registry without a network.
//! Like any real registry it is untrusted: it stores whatever it is given
//! and never checks content against digests.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{stream, StreamExt};
use tokio::sync::RwLock;
use tracing::debug;

use tufreg_crypto::Digest;

use crate::auth::BearerToken;
use crate::error::{Error, Result};
use crate::{BlobChunks, BoxFuture, Registry};

/// Chunk size used when streaming blobs back out
const CHUNK_SIZE: usize = 8192;

/// An in-process registry
///
/// Thread-safe and cheap to clone; clones share the same storage.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use tufreg_store::{chunk_stream, MemoryRegistry, Registry};
/// use tufreg_crypto::Digest;
///
/// # async fn example() -> Result<(), tufreg_store::Error> {
/// let registry = MemoryRegistry::new();
/// let digest = Digest::of(b"hello");
/// registry
///     .put_blob(digest, chunk_stream(Bytes::from_static(b"hello")))
///     .await?;
/// assert_eq!(registry.blob_count().await, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    blobs: Arc<RwLock<HashMap<Digest, Bytes>>>,
    metadata: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    required_token: Option<BearerToken>,
    presented_token: Arc<RwLock<Option<BearerToken>>>,
}

impl MemoryRegistry {
    /// Create an open registry (no token required)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that rejects every operation until
    /// [`MemoryRegistry::authorize`] presents the matching token
    pub fn with_required_token(token: BearerToken) -> Self {
        Self {
            required_token: Some(token),
            ..Self::default()
        }
    }

    /// Present a bearer token for subsequent operations
    pub async fn authorize(&self, token: BearerToken) {
        *self.presented_token.write().await = Some(token);
    }

    /// Number of stored blobs
    pub async fn blob_count(&self) -> usize {
        self.blobs.read().await.len()
    }

    /// Number of stored metadata documents
    pub async fn metadata_count(&self) -> usize {
        self.metadata.read().await.len()
    }

    async fn check_token(&self) -> Result<()> {
        match &self.required_token {
            None => Ok(()),
            Some(required) => {
                let presented = self.presented_token.read().await;
                if presented.as_ref() == Some(required) {
                    Ok(())
                } else {
                    Err(Error::Unauthorized)
                }
            }
        }
    }
}

impl Registry for MemoryRegistry {
    fn put_blob(&self, digest: Digest, mut chunks: BlobChunks) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.check_token().await?;

            let mut data = Vec::new();
            while let Some(chunk) = chunks.next().await {
                data.extend_from_slice(&chunk?);
            }

            debug!(digest = %digest.short(), len = data.len(), "stored blob");
            self.blobs.write().await.insert(digest, Bytes::from(data));
            Ok(())
        })
    }

    fn get_blob(&self, digest: Digest) -> BoxFuture<'_, Result<BlobChunks>> {
        Box::pin(async move {
            self.check_token().await?;

            let blobs = self.blobs.read().await;
            let data = blobs
                .get(&digest)
                .cloned()
                .ok_or(Error::BlobNotFound(digest))?;
            drop(blobs);

            let chunks: Vec<Result<Bytes>> = (0..data.len())
                .step_by(CHUNK_SIZE.max(1))
                .map(|start| {
                    let end = (start + CHUNK_SIZE).min(data.len());
                    Ok(data.slice(start..end))
                })
                .collect();
            Ok(Box::pin(stream::iter(chunks)) as BlobChunks)
        })
    }

    fn delete_blob(&self, digest: Digest) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.check_token().await?;
            if self.blobs.write().await.remove(&digest).is_none() {
                return Err(Error::BlobNotFound(digest));
            }
            debug!(digest = %digest.short(), "deleted blob");
            Ok(())
        })
    }

    fn has_blob(&self, digest: Digest) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            self.check_token().await?;
            Ok(self.blobs.read().await.contains_key(&digest))
        })
    }

    fn put_metadata<'a>(&'a self, name: &'a str, bytes: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.check_token().await?;
            debug!(name, len = bytes.len(), "stored metadata document");
            self.metadata
                .write()
                .await
                .insert(name.to_string(), bytes.to_vec());
            Ok(())
        })
    }

    fn get_metadata<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            self.check_token().await?;
            self.metadata
                .read()
                .await
                .get(name)
                .cloned()
                .ok_or_else(|| Error::MetadataNotFound(name.to_string()))
        })
    }
}
