//! End-to-end publish/pull tests
//!
//! These tests drive a master and a replica against the in-memory registry
//! and validate the complete publish, verify, and pull flow.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tufreg::{
    Action, BearerToken, Credentials, Digest, Error, Master, MemoryAuth, MemoryRegistry, Registry,
    Replica, RepositoryContext, Role, TargetSource,
};
use tufreg_store::chunk_stream;

struct TestRepo {
    dir: tempfile::TempDir,
    ctx: RepositoryContext,
    registry: Arc<MemoryRegistry>,
}

impl TestRepo {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RepositoryContext::new(dir.path().join("repos"), "app").unwrap();
        Self {
            dir,
            ctx,
            registry: Arc::new(MemoryRegistry::new()),
        }
    }

    fn master(&self) -> Master {
        Master::open(self.ctx.clone(), self.registry.clone()).unwrap()
    }

    fn replica(&self) -> Replica {
        Replica::open(self.ctx.clone(), self.registry.clone())
    }

    /// A master with keys created and metadata at version 1
    async fn published_master(&self) -> Master {
        let mut master = self.master();
        master.create_root_key(None).unwrap();
        master.create_metadata_keys(None, None, None).unwrap();
        master.create_metadata(None, None, None, None).await.unwrap();
        master
    }

    fn write_file(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }
}

/// Progress recorder collecting (digest, chunk_len, total) triples
fn recorder() -> (Arc<Mutex<Vec<(Digest, usize, u64)>>>, Arc<dyn tufreg::Progress>) {
    let seen: Arc<Mutex<Vec<(Digest, usize, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let observer = {
        let seen = Arc::clone(&seen);
        move |digest: Digest, chunk_len: usize, total: u64| {
            seen.lock().unwrap().push((digest, chunk_len, total));
        }
    };
    (seen, Arc::new(observer))
}

async fn registry_version(registry: &MemoryRegistry, role: Role) -> u64 {
    let bytes = registry.get_metadata(role.name()).await.unwrap();
    tufreg_metadata::SignedMetadata::from_bytes(&bytes)
        .unwrap()
        .version()
}

// ==== The full scenario from a cold start ====

#[tokio::test]
async fn test_publish_and_pull_roundtrip() {
    let fx = TestRepo::new();
    let mut master = fx.published_master().await;

    // create_metadata wrote all four documents at version 1
    assert_eq!(fx.registry.metadata_count().await, 4);
    for role in Role::ALL {
        assert_eq!(registry_version(&fx.registry, role).await, 1);
    }

    let file = fx.write_file("blob", b"abc");
    master
        .push_target("v1", &[TargetSource::File(file)], None)
        .await
        .unwrap();
    assert!(fx.registry.has_blob(Digest::of(b"abc")).await.unwrap());
    assert_eq!(master.list_targets(), vec!["v1".to_string()]);

    master.push_metadata(None, None, None).await.unwrap();
    for role in [Role::Targets, Role::Snapshot, Role::Timestamp] {
        assert_eq!(registry_version(&fx.registry, role).await, 2);
    }
    assert_eq!(registry_version(&fx.registry, Role::Root).await, 1);

    // Fresh consumer, bootstrapped from the pinned public key
    let pinned = master.root_public_key_pem().unwrap();
    let replica = fx.replica();
    let diff = replica.pull_metadata(Some(pinned.as_str())).await.unwrap();
    assert_eq!(diff.added, vec!["v1".to_string()]);
    assert!(diff.changed.is_empty());
    assert!(diff.removed.is_empty());

    assert_eq!(replica.list_targets().unwrap(), vec!["v1".to_string()]);
    assert_eq!(replica.blob_sizes("v1").unwrap(), vec![3]);

    let fetches = replica.pull_target("v1", None).await.unwrap();
    assert_eq!(fetches.len(), 1);
    assert_eq!(fetches[0].digest, Digest::of(b"abc"));
    assert_eq!(fetches[0].size, 3);
    let bytes = fetches.into_iter().next().unwrap().read_to_vec().await.unwrap();
    assert_eq!(bytes, b"abc");
}

#[tokio::test]
async fn test_fresh_verifier_matches_pending_set() {
    let fx = TestRepo::new();
    let mut master = fx.published_master().await;

    for name in ["a", "b", "c"] {
        let file = fx.write_file(name, name.as_bytes());
        master
            .push_target(name, &[TargetSource::File(file)], None)
            .await
            .unwrap();
    }
    master.del_target(&["b"]).await.unwrap();
    master.push_metadata(None, None, None).await.unwrap();

    let pinned = master.root_public_key_pem().unwrap();
    let replica = fx.replica();
    replica.pull_metadata(Some(pinned.as_str())).await.unwrap();

    assert_eq!(
        replica.list_targets().unwrap(),
        vec!["a".to_string(), "c".to_string()]
    );
    assert_eq!(master.list_targets(), replica.list_targets().unwrap());
}

// ==== Deletion and blob garbage collection ====

#[tokio::test]
async fn test_delete_target_removes_blob_and_empties_list() {
    let fx = TestRepo::new();
    let mut master = fx.published_master().await;
    let digest = Digest::of(b"abc");

    let file = fx.write_file("blob", b"abc");
    master
        .push_target("v1", &[TargetSource::File(file)], None)
        .await
        .unwrap();
    master.push_metadata(None, None, None).await.unwrap();

    let pinned = master.root_public_key_pem().unwrap();
    let replica = fx.replica();
    replica.pull_metadata(Some(pinned.as_str())).await.unwrap();

    master.del_target(&["v1"]).await.unwrap();
    assert!(!fx.registry.has_blob(digest).await.unwrap());
    master.push_metadata(None, None, None).await.unwrap();

    let diff = replica.pull_metadata(None).await.unwrap();
    assert_eq!(diff.removed, vec!["v1".to_string()]);
    assert!(replica.list_targets().unwrap().is_empty());

    // Deleting again is a silent no-op
    master.del_target(&["v1"]).await.unwrap();
}

#[tokio::test]
async fn test_shared_blob_survives_partial_delete() {
    let fx = TestRepo::new();
    let mut master = fx.published_master().await;
    let digest = Digest::of(b"shared");

    let file = fx.write_file("blob", b"shared");
    master
        .push_target("a", &[TargetSource::File(file)], None)
        .await
        .unwrap();
    master
        .push_target("b", &[TargetSource::Target("a".to_string())], None)
        .await
        .unwrap();

    // Both targets reference the digest; deleting one must keep the blob
    master.del_target(&["a"]).await.unwrap();
    assert!(fx.registry.has_blob(digest).await.unwrap());

    master.del_target(&["b"]).await.unwrap();
    assert!(!fx.registry.has_blob(digest).await.unwrap());
}

// ==== Idempotence and deduplication ====

#[tokio::test]
async fn test_idempotent_push_stores_one_blob() {
    let fx = TestRepo::new();
    let mut master = fx.published_master().await;

    let file = fx.write_file("blob", b"abc");
    master
        .push_target("v1", &[TargetSource::File(file.clone())], None)
        .await
        .unwrap();
    let count = fx.registry.blob_count().await;

    master
        .push_target("v1", &[TargetSource::File(file)], None)
        .await
        .unwrap();
    assert_eq!(fx.registry.blob_count().await, count);
    assert_eq!(master.list_targets(), vec!["v1".to_string()]);
}

#[tokio::test]
async fn test_dedup_reference_uploads_zero_bytes() {
    let fx = TestRepo::new();
    let mut master = fx.published_master().await;

    let file = fx.write_file("blob", b"abc");
    let (seen_a, progress_a) = recorder();
    master
        .push_target("a", &[TargetSource::File(file)], Some(progress_a))
        .await
        .unwrap();
    let transferred: usize = seen_a.lock().unwrap().iter().map(|(_, n, _)| n).sum();
    assert_eq!(transferred, 3);

    // Referencing an existing target's blob transfers nothing
    let (seen_b, progress_b) = recorder();
    master
        .push_target("b", &[TargetSource::Target("a".to_string())], Some(progress_b))
        .await
        .unwrap();
    assert!(seen_b.lock().unwrap().is_empty());
    assert_eq!(fx.registry.blob_count().await, 1);

    // Re-pushing identical content skips the upload entirely
    let file = fx.write_file("blob2", b"abc");
    let (seen_c, progress_c) = recorder();
    master
        .push_target("c", &[TargetSource::File(file)], Some(progress_c))
        .await
        .unwrap();
    assert!(seen_c.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_push_progress_reports_chunks_then_completion() {
    let fx = TestRepo::new();
    let mut master = fx.published_master().await;
    let digest = Digest::of(b"abc");

    let file = fx.write_file("blob", b"abc");
    let (seen, progress) = recorder();
    master
        .push_target("v1", &[TargetSource::File(file)], Some(progress))
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(*seen, vec![(digest, 3, 3), (digest, 0, 3)]);
}

// ==== Digest integrity ====

#[tokio::test]
async fn test_corrupted_blob_fails_pull_with_digest_mismatch() {
    let fx = TestRepo::new();
    let mut master = fx.published_master().await;
    let digest = Digest::of(b"abc");

    let file = fx.write_file("blob", b"abc");
    master
        .push_target("v1", &[TargetSource::File(file)], None)
        .await
        .unwrap();
    master.push_metadata(None, None, None).await.unwrap();

    let pinned = master.root_public_key_pem().unwrap();
    let replica = fx.replica();
    replica.pull_metadata(Some(pinned.as_str())).await.unwrap();

    // The registry is untrusted: corrupt one byte under the same digest
    fx.registry
        .put_blob(digest, chunk_stream(bytes::Bytes::from_static(b"abx")))
        .await
        .unwrap();

    let fetches = replica.pull_target("v1", None).await.unwrap();
    let result = fetches.into_iter().next().unwrap().read_to_vec().await;
    assert!(matches!(result, Err(Error::DigestMismatch { .. })));
}

// ==== Key lifecycle preconditions ====

#[tokio::test]
async fn test_key_lifecycle_ordering() {
    let fx = TestRepo::new();
    let mut master = fx.master();

    // Metadata keys need a root key first
    assert!(matches!(
        master.create_metadata_keys(None, None, None),
        Err(Error::MissingRootKey)
    ));
    assert!(matches!(
        master.root_public_key_pem(),
        Err(Error::MissingRootKey)
    ));

    master.create_root_key(None).unwrap();
    assert!(matches!(
        master.create_root_key(None),
        Err(Error::KeyExists(Role::Root))
    ));

    master.create_metadata_keys(None, None, None).unwrap();
    assert!(matches!(
        master.create_metadata_keys(None, None, None),
        Err(Error::KeyExists(Role::Targets))
    ));

    // Metadata must exist before it can be refreshed
    assert!(matches!(
        master.push_metadata(None, None, None).await,
        Err(Error::MetadataNotCreated)
    ));

    master.create_metadata(None, None, None, None).await.unwrap();
    assert!(matches!(
        master.create_metadata(None, None, None, None).await,
        Err(Error::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_encrypted_keys_roundtrip_and_wrong_password() {
    let fx = TestRepo::new();
    let mut master = fx.master();

    master.create_root_key(Some("root-pw")).unwrap();
    master
        .create_metadata_keys(Some("targets-pw"), Some("snapshot-pw"), Some("timestamp-pw"))
        .unwrap();
    master
        .create_metadata(
            Some("root-pw"),
            Some("targets-pw"),
            Some("snapshot-pw"),
            Some("timestamp-pw"),
        )
        .await
        .unwrap();

    assert!(matches!(
        master
            .push_metadata(Some("wrong"), Some("snapshot-pw"), Some("timestamp-pw"))
            .await,
        Err(Error::Crypto(_))
    ));

    master
        .push_metadata(Some("targets-pw"), Some("snapshot-pw"), Some("timestamp-pw"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_push_target_input_validation() {
    let fx = TestRepo::new();
    let mut master = fx.published_master().await;

    assert!(matches!(
        master.push_target("v1", &[], None).await,
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        master
            .push_target("@bad", &[TargetSource::File(fx.write_file("f", b"x"))], None)
            .await,
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        master
            .push_target("v1", &[TargetSource::Target("ghost".to_string())], None)
            .await,
        Err(Error::TargetNotFound(_))
    ));
}

// ==== Expirations and local state ====

#[tokio::test]
async fn test_expirations_both_sides() {
    let fx = TestRepo::new();
    let mut master = fx.published_master().await;

    let expirations = master.get_expirations().unwrap();
    assert_eq!(expirations.len(), 4);
    // Faster-rotating roles expire sooner
    assert!(expirations[&Role::Timestamp] < expirations[&Role::Snapshot]);
    assert!(expirations[&Role::Snapshot] < expirations[&Role::Targets]);
    assert!(expirations[&Role::Targets] < expirations[&Role::Root]);

    let replica = fx.replica();
    assert!(matches!(
        replica.get_expirations(),
        Err(Error::NoTrustedMetadata)
    ));

    master.push_metadata(None, None, None).await.unwrap();
    let pinned = master.root_public_key_pem().unwrap();
    replica.pull_metadata(Some(pinned.as_str())).await.unwrap();
    assert_eq!(replica.get_expirations().unwrap().len(), 4);
}

#[tokio::test]
async fn test_check_target_reports_per_file() {
    let fx = TestRepo::new();
    let mut master = fx.published_master().await;

    let file = fx.write_file("blob", b"abc");
    master
        .push_target("v1", &[TargetSource::File(file.clone())], None)
        .await
        .unwrap();
    master.push_metadata(None, None, None).await.unwrap();

    let pinned = master.root_public_key_pem().unwrap();
    let replica = fx.replica();
    replica.pull_metadata(Some(pinned.as_str())).await.unwrap();

    let checks = replica.check_target("v1", &[file]).unwrap();
    assert_eq!(checks.len(), 1);
    assert!(checks[0].ok);

    let stale = fx.write_file("stale", b"abx");
    let checks = replica.check_target("v1", &[stale]).unwrap();
    assert!(!checks[0].ok);
    assert_eq!(checks[0].expected, Digest::of(b"abc"));

    assert!(matches!(
        replica.check_target("v1", &[]),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        replica.check_target("ghost", &[]),
        Err(Error::TargetNotFound(_))
    ));
}

// ==== Auth ====

#[tokio::test]
async fn test_token_gated_registry() {
    let token = BearerToken::new("tok-1");
    let dir = tempfile::tempdir().unwrap();
    let ctx = RepositoryContext::new(dir.path().join("repos"), "app").unwrap();
    let registry = Arc::new(MemoryRegistry::with_required_token(token.clone()));
    let auth = Arc::new(MemoryAuth::new(
        Credentials::new("alice", "hunter2"),
        token,
    ));

    let mut master = Master::open(ctx, registry.clone())
        .unwrap()
        .with_auth(auth);
    master.create_root_key(None).unwrap();
    master.create_metadata_keys(None, None, None).unwrap();

    // Registry operations are rejected until the token is presented
    assert!(matches!(
        master.create_metadata(None, None, None, None).await,
        Err(Error::Unauthorized)
    ));

    assert!(matches!(
        master
            .authenticate(&Credentials::new("alice", "wrong"), &[Action::Push])
            .await,
        Err(Error::Unauthorized)
    ));

    let issued = master
        .authenticate(&Credentials::new("alice", "hunter2"), &[Action::Push])
        .await
        .unwrap();
    registry.authorize(issued).await;
    master.create_metadata(None, None, None, None).await.unwrap();
}
