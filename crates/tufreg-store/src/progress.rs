//! Progress observer contract
//!
//! Blob transfers report progress per digest: one call per transferred
//! chunk with the chunk's length, then a final zero-length call signalling
//! the end of that digest's stream. Transfers that are skipped entirely
//! (the digest already exists, or a target reuses another target's blobs)
//! produce no calls at all.

use tufreg_crypto::Digest;

/// Observer invoked for every transferred chunk
pub trait Progress: Send + Sync {
    /// `chunk_len` bytes of `digest` were transferred; `total` is the
    /// blob's full size. A zero `chunk_len` signals completion.
    fn transferred(&self, digest: Digest, chunk_len: usize, total: u64);
}

impl<F> Progress for F
where
    F: Fn(Digest, usize, u64) + Send + Sync,
{
    fn transferred(&self, digest: Digest, chunk_len: usize, total: u64) {
        self(digest, chunk_len, total)
    }
}
