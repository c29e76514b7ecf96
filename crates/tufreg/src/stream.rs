//! Digest-verifying blob streams
//!
//! A pulled blob is a lazy, finite, non-restartable sequence of chunks.
//! The stream hashes every chunk as it passes through and compares the
//! result against the trusted digest when the underlying stream ends; on
//! disagreement the final item is an error and any bytes already yielded
//! must be treated as untrusted. Received length is capped by the declared
//! size, so a malicious registry cannot stream without end.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::warn;

use tufreg_crypto::{Digest, Sha256Hasher};
use tufreg_store::{BlobChunks, Progress};

use crate::error::{Error, Result};

/// A chunk stream that re-verifies content against a trusted digest
pub struct VerifyingStream {
    inner: BlobChunks,
    hasher: Option<Sha256Hasher>,
    expected: Digest,
    declared_size: u64,
    received: u64,
    progress: Option<Arc<dyn Progress>>,
    done: bool,
}

impl VerifyingStream {
    pub(crate) fn new(
        inner: BlobChunks,
        expected: Digest,
        declared_size: u64,
        progress: Option<Arc<dyn Progress>>,
    ) -> Self {
        Self {
            inner,
            hasher: Some(Sha256Hasher::new()),
            expected,
            declared_size,
            received: 0,
            progress,
            done: false,
        }
    }

    /// The trusted digest this stream verifies against
    pub fn digest(&self) -> Digest {
        self.expected
    }

    /// The declared size of the blob
    pub fn size(&self) -> u64 {
        self.declared_size
    }

    /// Collect the whole verified blob into memory
    ///
    /// Convenience for small blobs; fails exactly where streaming would.
    pub async fn read_to_vec(mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        while let Some(chunk) = self.next().await {
            data.extend_from_slice(&chunk?);
        }
        Ok(data)
    }

    fn fail(&mut self, error: Error) -> Poll<Option<Result<Bytes>>> {
        warn!(digest = %self.expected.short(), error = %error, "blob stream rejected");
        self.done = true;
        Poll::Ready(Some(Err(error)))
    }
}

impl Stream for VerifyingStream {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match ready!(this.inner.as_mut().poll_next(cx)) {
            Some(Ok(chunk)) => {
                if let Some(hasher) = this.hasher.as_mut() {
                    hasher.update(&chunk);
                }
                this.received += chunk.len() as u64;
                if this.received > this.declared_size {
                    let (digest, declared, received) =
                        (this.expected, this.declared_size, this.received);
                    return this.fail(Error::SizeMismatch {
                        digest,
                        declared,
                        received,
                    });
                }
                if let Some(progress) = &this.progress {
                    progress.transferred(this.expected, chunk.len(), this.declared_size);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(e)) => {
                this.done = true;
                Poll::Ready(Some(Err(e.into())))
            }
            None => {
                this.done = true;
                if this.received != this.declared_size {
                    let (digest, declared, received) =
                        (this.expected, this.declared_size, this.received);
                    return this.fail(Error::SizeMismatch {
                        digest,
                        declared,
                        received,
                    });
                }
                match this.hasher.take() {
                    Some(hasher) => {
                        let actual = hasher.finalize();
                        if actual != this.expected {
                            let expected = this.expected;
                            return this.fail(Error::DigestMismatch { expected, actual });
                        }
                        if let Some(progress) = &this.progress {
                            progress.transferred(this.expected, 0, this.declared_size);
                        }
                        Poll::Ready(None)
                    }
                    None => Poll::Ready(None),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::sync::Mutex;

    fn chunks_of(parts: &[&'static [u8]]) -> BlobChunks {
        let items: Vec<tufreg_store::Result<Bytes>> = parts
            .iter()
            .map(|part| Ok(Bytes::from_static(part)))
            .collect();
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn test_matching_content_passes() {
        let stream = VerifyingStream::new(chunks_of(&[b"ab", b"c"]), Digest::of(b"abc"), 3, None);
        assert_eq!(stream.read_to_vec().await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_corrupted_content_fails() {
        let stream = VerifyingStream::new(chunks_of(&[b"abx"]), Digest::of(b"abc"), 3, None);
        assert!(matches!(
            stream.read_to_vec().await,
            Err(Error::DigestMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_truncated_content_fails() {
        let stream = VerifyingStream::new(chunks_of(&[b"ab"]), Digest::of(b"abc"), 3, None);
        assert!(matches!(
            stream.read_to_vec().await,
            Err(Error::SizeMismatch {
                declared: 3,
                received: 2,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_oversized_content_fails_before_end() {
        let stream = VerifyingStream::new(
            chunks_of(&[b"abc", b"extra"]),
            Digest::of(b"abc"),
            3,
            None,
        );
        assert!(matches!(
            stream.read_to_vec().await,
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_progress_reports_chunks_then_completion() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = {
            let seen = Arc::clone(&seen);
            move |digest: Digest, chunk_len: usize, total: u64| {
                seen.lock().unwrap().push((digest, chunk_len, total));
            }
        };
        let digest = Digest::of(b"abc");
        let stream = VerifyingStream::new(
            chunks_of(&[b"ab", b"c"]),
            digest,
            3,
            Some(Arc::new(recorder)),
        );
        stream.read_to_vec().await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![(digest, 2, 3), (digest, 1, 3), (digest, 0, 3)]);
    }
}
