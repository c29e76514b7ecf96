//! The publisher-side repository engine
//!
//! A [`Master`] holds the private role keys and write access to the
//! registry. Target mutations accumulate in an in-memory pending set and
//! only take effect for consumers once `push_metadata` signs and uploads
//! the chain that references them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::{future::try_join_all, stream, StreamExt};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use tufreg_crypto::{Digest, KeyPair, KeyStore, PublicKeyPem, Sha256Hasher};
use tufreg_metadata::{
    BlobRef, MetadataBuilder, Payload, RepositoryKeys, Role, RoleLifetimes, SignedMetadata,
};
use tufreg_store::{
    Action, AuthProvider, BearerToken, BlobChunks, Credentials, Progress, Registry,
};

use crate::error::{Error, Result};
use crate::repo::RepositoryContext;

/// Chunk size for file hashing and uploads
const CHUNK_SIZE: usize = 8192;

/// One source of a pushed target: a local file's bytes, or a reference to
/// an existing target's blobs (deduplicated, never re-uploaded)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSource {
    /// Upload the contents of this file
    File(PathBuf),
    /// Reuse the blobs of the named existing target
    Target(String),
}

impl TargetSource {
    /// Parse a CLI-style source: `@name` references a target, anything
    /// else is a file path
    pub fn parse(s: &str) -> Self {
        match s.strip_prefix('@') {
            Some(name) => TargetSource::Target(name.to_string()),
            None => TargetSource::File(PathBuf::from(s)),
        }
    }
}

/// The publisher-side repository handle
pub struct Master {
    ctx: RepositoryContext,
    registry: Arc<dyn Registry>,
    builder: MetadataBuilder,
    auth: Option<Arc<dyn AuthProvider>>,
    pending: BTreeMap<String, Vec<BlobRef>>,
}

impl Master {
    /// Open the master side of a repository
    ///
    /// The pending target set is seeded from the current local targets
    /// document, if metadata has been created before.
    pub fn open(ctx: RepositoryContext, registry: Arc<dyn Registry>) -> Result<Self> {
        let mut master = Self {
            ctx,
            registry,
            builder: MetadataBuilder::new(),
            auth: None,
            pending: BTreeMap::new(),
        };
        if let Some(doc) = master.read_doc(Role::Targets)? {
            if let Payload::Targets(payload) = &doc.signed {
                master.pending = payload.targets.clone();
            }
        }
        Ok(master)
    }

    /// Use custom per-role metadata lifetimes
    pub fn with_lifetimes(mut self, lifetimes: RoleLifetimes) -> Self {
        self.builder = MetadataBuilder::with_lifetimes(lifetimes);
        self
    }

    /// Attach an auth collaborator
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Exchange credentials for a bearer token scoped to `actions`
    ///
    /// The caller supplies the returned token to its registry transport.
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

    // ---- key lifecycle ----

    /// Generate the root keypair for this repository
    ///
    /// The private key is stored encrypted when a password is supplied,
    /// plaintext otherwise (the caller's risk).
    pub fn create_root_key(&self, password: Option<&str>) -> Result<()> {
        let store = self.keystore();
        if store.exists(Role::Root.name()) {
            return Err(Error::KeyExists(Role::Root));
        }
        store.save(Role::Root.name(), &KeyPair::generate()?, password)?;
        info!(repo = self.ctx.repo(), "created root key");
        Ok(())
    }

    /// Generate the targets, snapshot, and timestamp keypairs
    pub fn create_metadata_keys(
        &self,
        targets_password: Option<&str>,
        snapshot_password: Option<&str>,
        timestamp_password: Option<&str>,
    ) -> Result<()> {
        let store = self.keystore();
        if !store.exists(Role::Root.name()) {
            return Err(Error::MissingRootKey);
        }
        for (role, password) in [
            (Role::Targets, targets_password),
            (Role::Snapshot, snapshot_password),
            (Role::Timestamp, timestamp_password),
        ] {
            if store.exists(role.name()) {
                return Err(Error::KeyExists(role));
            }
            store.save(role.name(), &KeyPair::generate()?, password)?;
        }
        info!(repo = self.ctx.repo(), "created metadata keys");
        Ok(())
    }

    /// Regenerate all four keypairs and bump the root document version
    ///
    /// Invalidates all previously issued trust for this repository: every
    /// consumer must re-pin the new root public key out of band. This is a
    /// local, master-side-only privileged action.
    pub async fn reset_keys(
        &mut self,
        root_password: Option<&str>,
        targets_password: Option<&str>,
        snapshot_password: Option<&str>,
        timestamp_password: Option<&str>,
    ) -> Result<()> {
        let root_version = match self.read_doc(Role::Root)? {
            Some(doc) => doc.version(),
            None => return Err(Error::MetadataNotCreated),
        };

        let store = self.keystore();
        for (role, password) in [
            (Role::Root, root_password),
            (Role::Targets, targets_password),
            (Role::Snapshot, snapshot_password),
            (Role::Timestamp, timestamp_password),
        ] {
            store.save(role.name(), &KeyPair::generate()?, password)?;
        }
        info!(repo = self.ctx.repo(), "reset all role keys");

        self.sign_and_push_chain(
            root_version + 1,
            root_password,
            targets_password,
            snapshot_password,
            timestamp_password,
        )
        .await
    }

    /// Export the root public key for out-of-band distribution
    pub fn root_public_key_pem(&self) -> Result<PublicKeyPem> {
        let store = self.keystore();
        if !store.exists(Role::Root.name()) {
            return Err(Error::MissingRootKey);
        }
        Ok(store.public_key_pem(Role::Root.name())?)
    }

    // ---- metadata lifecycle ----

    /// First-time generation of all four metadata documents at version 1
    pub async fn create_metadata(
        &mut self,
        root_password: Option<&str>,
        targets_password: Option<&str>,
        snapshot_password: Option<&str>,
        timestamp_password: Option<&str>,
    ) -> Result<()> {
        if self.read_doc(Role::Root)?.is_some() {
            return Err(Error::InvalidArgument(
                "metadata already created for this repository".into(),
            ));
        }
        self.sign_and_push_chain(
            1,
            root_password,
            targets_password,
            snapshot_password,
            timestamp_password,
        )
        .await
    }

    /// Re-sign targets, snapshot, and timestamp and upload them
    ///
    /// Always in that dependency order: snapshot pins the exact targets
    /// version and timestamp pins the exact snapshot version. Root is
    /// untouched unless a rotation is pending.
    pub async fn push_metadata(
        &mut self,
        targets_password: Option<&str>,
        snapshot_password: Option<&str>,
        timestamp_password: Option<&str>,
    ) -> Result<()> {
        let versions = self.current_versions()?;
        let now = Utc::now();

        let targets_key = self.load_key(Role::Targets, targets_password)?;
        let snapshot_key = self.load_key(Role::Snapshot, snapshot_password)?;
        let timestamp_key = self.load_key(Role::Timestamp, timestamp_password)?;

        let targets_doc = self.builder.build_targets(
            now,
            versions[&Role::Targets] + 1,
            self.pending.clone(),
            &targets_key,
        )?;
        let snapshot_doc = self.builder.build_snapshot(
            now,
            versions[&Role::Snapshot] + 1,
            &targets_doc,
            &snapshot_key,
        )?;
        let timestamp_doc = self.builder.build_timestamp(
            now,
            versions[&Role::Timestamp] + 1,
            &snapshot_doc,
            &timestamp_key,
        )?;

        // Upload in dependency order, timestamp last, so consumers either
        // see the old chain or the complete new one; record locally only
        // once the registry has everything.
        for doc in [&targets_doc, &snapshot_doc, &timestamp_doc] {
            self.upload_doc(doc).await?;
        }
        for doc in [&targets_doc, &snapshot_doc, &timestamp_doc] {
            self.write_doc(doc)?;
        }
        info!(
            repo = self.ctx.repo(),
            targets = targets_doc.version(),
            "pushed metadata"
        );
        Ok(())
    }

    /// Expiration per role, read from the current local documents
    pub fn get_expirations(&self) -> Result<BTreeMap<Role, DateTime<Utc>>> {
        let mut expirations = BTreeMap::new();
        for role in Role::ALL {
            let doc = self.read_doc(role)?.ok_or(Error::MetadataNotCreated)?;
            expirations.insert(role, doc.expires());
        }
        Ok(expirations)
    }

    // ---- target store ----

    /// Stage a target from files and/or other targets' blobs, uploading
    /// any blob the registry does not already hold
    ///
    /// Uploads for distinct digests run concurrently, each reporting
    /// progress under its own digest. Re-pushing identical content uploads
    /// nothing.
    pub async fn push_target(
        &mut self,
        name: &str,
        sources: &[TargetSource],
        progress: Option<Arc<dyn Progress>>,
    ) -> Result<()> {
        if sources.is_empty() {
            return Err(Error::InvalidArgument(
                "push_target needs at least one file or @target source".into(),
            ));
        }
        if name.is_empty() || name.starts_with('@') {
            return Err(Error::InvalidArgument(format!(
                "invalid target name: {:?}",
                name
            )));
        }

        let mut refs: Vec<BlobRef> = Vec::new();
        let mut uploads: HashMap<Digest, (PathBuf, u64)> = HashMap::new();
        for source in sources {
            match source {
                TargetSource::File(path) => {
                    let (digest, size) = digest_file(path.clone()).await?;
                    refs.push(BlobRef { digest, size });
                    uploads.entry(digest).or_insert((path.clone(), size));
                }
                TargetSource::Target(other) => {
                    let blobs = self
                        .pending
                        .get(other)
                        .ok_or_else(|| Error::TargetNotFound(other.clone()))?;
                    refs.extend(blobs.iter().cloned());
                }
            }
        }

        let jobs = uploads.into_iter().map(|(digest, (path, size))| {
            let registry = Arc::clone(&self.registry);
            let progress = progress.clone();
            async move {
                if registry.has_blob(digest).await? {
                    debug!(digest = %digest.short(), "blob already present, skipping upload");
                    return Ok::<_, Error>(());
                }
                let file = tokio::fs::File::open(&path).await?;
                let chunks = match progress.clone() {
                    Some(progress) => tee_progress(file_chunks(file), progress, digest, size),
                    None => file_chunks(file),
                };
                registry.put_blob(digest, chunks).await?;
                if let Some(progress) = &progress {
                    progress.transferred(digest, 0, size);
                }
                info!(digest = %digest.short(), size, "uploaded blob");
                Ok(())
            }
        });
        try_join_all(jobs).await?;

        self.pending.insert(name.to_string(), refs);
        info!(name, "staged target");
        Ok(())
    }

    /// Remove targets from the pending set; blobs no longer referenced by
    /// any pending target are deleted from the registry
    ///
    /// Unknown names are a silent no-op, so deletion is idempotent.
    pub async fn del_target(&mut self, names: &[&str]) -> Result<()> {
        let mut removed: BTreeSet<Digest> = BTreeSet::new();
        for name in names {
            match self.pending.remove(*name) {
                Some(blobs) => {
                    removed.extend(blobs.into_iter().map(|blob| blob.digest));
                    info!(name = *name, "removed target");
                }
                None => debug!(name = *name, "target not present, nothing to remove"),
            }
        }

        let referenced: BTreeSet<Digest> = self
            .pending
            .values()
            .flatten()
            .map(|blob| blob.digest)
            .collect();
        for digest in removed.difference(&referenced) {
            match self.registry.delete_blob(*digest).await {
                Ok(()) => info!(digest = %digest.short(), "deleted unreferenced blob"),
                Err(tufreg_store::Error::BlobNotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Names in the pending target set
    pub fn list_targets(&self) -> Vec<String> {
        self.pending.keys().cloned().collect()
    }

    // ---- internals ----

    fn keystore(&self) -> KeyStore {
        KeyStore::new(self.ctx.master_keys_dir())
    }

    fn load_key(&self, role: Role, password: Option<&str>) -> Result<KeyPair> {
        let store = self.keystore();
        if !store.exists(role.name()) {
            return match role {
                Role::Root => Err(Error::MissingRootKey),
                _ => Err(Error::InvalidArgument(format!(
                    "{} key missing; run create_metadata_keys first",
                    role
                ))),
            };
        }
        Ok(store.load(role.name(), password)?)
    }

    fn current_versions(&self) -> Result<BTreeMap<Role, u64>> {
        let mut versions = BTreeMap::new();
        for role in [Role::Targets, Role::Snapshot, Role::Timestamp] {
            let doc = self.read_doc(role)?.ok_or(Error::MetadataNotCreated)?;
            versions.insert(role, doc.version());
        }
        Ok(versions)
    }

    /// Sign the full chain at the given root version and upload all four
    /// documents, root first
    async fn sign_and_push_chain(
        &mut self,
        root_version: u64,
        root_password: Option<&str>,
        targets_password: Option<&str>,
        snapshot_password: Option<&str>,
        timestamp_password: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        let root_key = self.load_key(Role::Root, root_password)?;
        let targets_key = self.load_key(Role::Targets, targets_password)?;
        let snapshot_key = self.load_key(Role::Snapshot, snapshot_password)?;
        let timestamp_key = self.load_key(Role::Timestamp, timestamp_password)?;

        let dependent_version = |role: Role| -> Result<u64> {
            Ok(match self.read_doc(role)? {
                Some(doc) => doc.version() + 1,
                None => 1,
            })
        };

        let keys = RepositoryKeys::single(&root_key, &targets_key, &snapshot_key, &timestamp_key);
        let root_doc = self.builder.build_root(now, root_version, &keys)?;
        let targets_doc = self.builder.build_targets(
            now,
            dependent_version(Role::Targets)?,
            self.pending.clone(),
            &targets_key,
        )?;
        let snapshot_doc = self.builder.build_snapshot(
            now,
            dependent_version(Role::Snapshot)?,
            &targets_doc,
            &snapshot_key,
        )?;
        let timestamp_doc = self.builder.build_timestamp(
            now,
            dependent_version(Role::Timestamp)?,
            &snapshot_doc,
            &timestamp_key,
        )?;

        for doc in [&root_doc, &targets_doc, &snapshot_doc, &timestamp_doc] {
            self.upload_doc(doc).await?;
        }
        for doc in [&root_doc, &targets_doc, &snapshot_doc, &timestamp_doc] {
            self.write_doc(doc)?;
        }
        info!(
            repo = self.ctx.repo(),
            root = root_version,
            "signed and pushed full metadata chain"
        );
        Ok(())
    }

    fn doc_path(&self, role: Role) -> PathBuf {
        self.ctx
            .master_metadata_dir()
            .join(format!("{}.json", role.name()))
    }

    fn read_doc(&self, role: Role) -> Result<Option<SignedMetadata>> {
        match std::fs::read(self.doc_path(role)) {
            Ok(bytes) => Ok(Some(SignedMetadata::from_bytes(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_doc(&self, doc: &SignedMetadata) -> Result<()> {
        let path = self.doc_path(doc.role());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, doc.to_bytes()?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    async fn upload_doc(&self, doc: &SignedMetadata) -> Result<()> {
        let bytes = doc.to_bytes()?;
        self.registry
            .put_metadata(doc.role().name(), &bytes)
            .await?;
        Ok(())
    }
}

/// Hash a file in chunks, returning its digest and size
async fn digest_file(path: PathBuf) -> Result<(Digest, u64)> {
    let mut file = tokio::fs::File::open(&path).await?;
    let mut hasher = Sha256Hasher::new();
    let mut size = 0u64;
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((hasher.finalize(), size))
}

/// Stream a file as blob chunks
fn file_chunks(file: tokio::fs::File) -> BlobChunks {
    Box::pin(stream::unfold(file, |mut file| async move {
        let mut buf = vec![0u8; CHUNK_SIZE];
        match file.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), file))
            }
            Err(e) => Some((Err(tufreg_store::Error::Io(e)), file)),
        }
    }))
}

/// Invoke the progress observer for every chunk passing through
fn tee_progress(
    chunks: BlobChunks,
    progress: Arc<dyn Progress>,
    digest: Digest,
    total: u64,
) -> BlobChunks {
    Box::pin(chunks.map(move |chunk| {
        if let Ok(chunk) = &chunk {
            progress.transferred(digest, chunk.len(), total);
        }
        chunk
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_source_parse() {
        assert_eq!(
            TargetSource::parse("@base"),
            TargetSource::Target("base".to_string())
        );
        assert_eq!(
            TargetSource::parse("dir/file.bin"),
            TargetSource::File(PathBuf::from("dir/file.bin"))
        );
    }

    #[tokio::test]
    async fn test_digest_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, b"abc").unwrap();

        let (digest, size) = digest_file(path).await.unwrap();
        assert_eq!(digest, Digest::of(b"abc"));
        assert_eq!(size, 3);
    }
}
