//! The consumer-side repository engine
//!
//! A [`Replica`] (the "copy" side) holds only a trusted root public key
//! and read access. Its view of the target set derives exclusively from
//! verified metadata, never from listing the registry, and it can neither
//! push nor delete.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use tufreg_crypto::{Digest, PublicKeyPem, Sha256Hasher};
use tufreg_metadata::{BlobRef, Role};
use tufreg_store::{
    Action, AuthProvider, BearerToken, Credentials, Progress, Registry,
};

use crate::baseline::TrustBaseline;
use crate::error::{Error, Result};
use crate::repo::RepositoryContext;
use crate::stream::VerifyingStream;
use crate::verify::{ChainVerifier, TargetDiff};

/// One blob of a pulled target: trusted digest, declared size, and a
/// verifying chunk stream
pub struct BlobFetch {
    /// The trusted content digest
    pub digest: Digest,
    /// The declared size in bytes
    pub size: u64,
    stream: VerifyingStream,
}

impl BlobFetch {
    /// The verifying chunk stream for this blob
    pub fn into_stream(self) -> VerifyingStream {
        self.stream
    }

    /// Collect the whole verified blob into memory
    pub async fn read_to_vec(self) -> Result<Vec<u8>> {
        self.stream.read_to_vec().await
    }
}

/// Result of checking one local file against a target's trusted digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetCheck {
    /// The local file that was checked
    pub path: PathBuf,
    /// The digest the target declares at this position
    pub expected: Digest,
    /// Whether the file's content matches it
    pub ok: bool,
}

/// The consumer-side repository handle
pub struct Replica {
    ctx: RepositoryContext,
    registry: Arc<dyn Registry>,
    auth: Option<Arc<dyn AuthProvider>>,
}

impl Replica {
    /// Open the copy side of a repository
    pub fn open(ctx: RepositoryContext, registry: Arc<dyn Registry>) -> Self {
        Self {
            ctx,
            registry,
            auth: None,
        }
    }

    /// Attach an auth collaborator
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Exchange credentials for a bearer token scoped to `actions`
    pub async fn authenticate(
        &self,
        credentials: &Credentials,
        actions: &[Action],
    ) -> Result<BearerToken> {
        let auth = self
            .auth
            .as_ref()
            .ok_or_else(|| Error::InvalidArgument("no auth provider configured".into()))?;
        Ok(auth.authenticate(credentials, actions).await?)
    }

    /// Pull and verify the metadata chain, committing a new trust baseline
    ///
    /// With no previously trusted root, `root_public_key_pem` is the sole
    /// basis of initial trust; supplying it later re-pins after a key
    /// reset. Returns the added/changed/removed target names. On any
    /// verification failure nothing is committed and the previous baseline
    /// stays in force.
    pub async fn pull_metadata(
        &self,
        root_public_key_pem: Option<&str>,
    ) -> Result<TargetDiff> {
        let _lock = self.ctx.lock_copy()?;

        let baseline = TrustBaseline::load(&self.ctx.baseline_path())?;
        let pinned = root_public_key_pem.map(|pem| PublicKeyPem::new(pem.to_string()));
        let verifier = ChainVerifier::new(
            &*self.registry,
            self.ctx.baseline_path(),
            baseline,
            pinned.as_ref(),
            Utc::now(),
        );

        match verifier.run().await {
            Ok(diff) => {
                info!(
                    repo = self.ctx.repo(),
                    added = diff.added.len(),
                    changed = diff.changed.len(),
                    removed = diff.removed.len(),
                    "pull trusted"
                );
                Ok(diff)
            }
            Err(e) => {
                warn!(repo = self.ctx.repo(), error = %e, "pull rejected, baseline unchanged");
                Err(e)
            }
        }
    }

    /// Fetch a verified target's blobs as lazy verifying streams
    ///
    /// Each stream re-verifies the trusted digest incrementally; on
    /// mismatch the stream fails and prior output must be discarded.
    pub async fn pull_target(
        &self,
        name: &str,
        progress: Option<Arc<dyn Progress>>,
    ) -> Result<Vec<BlobFetch>> {
        let blobs = self.target_blobs(name)?;

        let mut fetches = Vec::with_capacity(blobs.len());
        for blob in blobs {
            let chunks = self.registry.get_blob(blob.digest).await?;
            fetches.push(BlobFetch {
                digest: blob.digest,
                size: blob.size,
                stream: VerifyingStream::new(chunks, blob.digest, blob.size, progress.clone()),
            });
        }
        Ok(fetches)
    }

    /// Declared sizes of a target's blobs, from trusted metadata only
    pub fn blob_sizes(&self, name: &str) -> Result<Vec<u64>> {
        Ok(self
            .target_blobs(name)?
            .iter()
            .map(|blob| blob.size)
            .collect())
    }

    /// Compare local files against a target's trusted digests, positionally
    ///
    /// Reports per-file pass/fail without downloading anything.
    pub fn check_target(&self, name: &str, files: &[PathBuf]) -> Result<Vec<TargetCheck>> {
        let blobs = self.target_blobs(name)?;
        if files.len() != blobs.len() {
            return Err(Error::InvalidArgument(format!(
                "target {} has {} blob(s), {} file(s) given",
                name,
                blobs.len(),
                files.len()
            )));
        }

        files
            .iter()
            .zip(blobs)
            .map(|(path, blob)| {
                let digest = digest_local_file(path)?;
                Ok(TargetCheck {
                    path: path.clone(),
                    expected: blob.digest,
                    ok: digest == blob.digest,
                })
            })
            .collect()
    }

    /// Names in the trusted target set
    pub fn list_targets(&self) -> Result<Vec<String>> {
        Ok(self.trusted_targets()?.keys().cloned().collect())
    }

    /// Expiration per role, from the last verified documents
    pub fn get_expirations(&self) -> Result<BTreeMap<Role, DateTime<Utc>>> {
        let baseline = TrustBaseline::load(&self.ctx.baseline_path())?;
        let mut expirations = BTreeMap::new();
        for role in Role::ALL {
            let doc = baseline.document(role).ok_or(Error::NoTrustedMetadata)?;
            expirations.insert(role, doc.expires());
        }
        Ok(expirations)
    }

    fn trusted_targets(&self) -> Result<BTreeMap<String, Vec<BlobRef>>> {
        let baseline = TrustBaseline::load(&self.ctx.baseline_path())?;
        if baseline.targets.is_none() {
            return Err(Error::NoTrustedMetadata);
        }
        Ok(baseline.targets_map())
    }

    fn target_blobs(&self, name: &str) -> Result<Vec<BlobRef>> {
        self.trusted_targets()?
            .remove(name)
            .ok_or_else(|| Error::TargetNotFound(name.to_string()))
    }
}

/// Hash a local file in chunks
fn digest_local_file(path: &Path) -> Result<Digest> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256Hasher::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}
