//! Metadata document construction and signing
//!
//! Documents must be built in dependency order: targets first, then
//! snapshot (which pins targets), then timestamp (which pins snapshot).
//! Building out of order produces a self-inconsistent chain that verifiers
//! reject, so the builder takes the already-signed child document wherever
//! a pin is needed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use tufreg_crypto::KeyPair;

use crate::document::{
    BlobRef, KeySpec, MetaPin, Payload, RoleKeys, RootPayload, SignedMetadata, SnapshotPayload,
    TargetsPayload, TimestampPayload,
};
use crate::error::{Error, Result};
use crate::role::{Role, RoleLifetimes};

/// The full signing key set of a repository
///
/// Root may hold several keys with a threshold; the dependent roles each
/// sign with a single key.
pub struct RepositoryKeys<'a> {
    /// Root keys
    pub root: Vec<&'a KeyPair>,
    /// Signatures required from root keys
    pub root_threshold: u32,
    /// Targets signing key
    pub targets: &'a KeyPair,
    /// Snapshot signing key
    pub snapshot: &'a KeyPair,
    /// Timestamp signing key
    pub timestamp: &'a KeyPair,
}

impl<'a> RepositoryKeys<'a> {
    /// A single-root-key set with threshold 1
    pub fn single(
        root: &'a KeyPair,
        targets: &'a KeyPair,
        snapshot: &'a KeyPair,
        timestamp: &'a KeyPair,
    ) -> Self {
        Self {
            root: vec![root],
            root_threshold: 1,
            targets,
            snapshot,
            timestamp,
        }
    }

    fn key_table(&self) -> BTreeMap<String, KeySpec> {
        let mut keys = BTreeMap::new();
        for key in &self.root {
            keys.insert(key.key_id(), KeySpec::from_keypair(key));
        }
        for key in [self.targets, self.snapshot, self.timestamp] {
            keys.insert(key.key_id(), KeySpec::from_keypair(key));
        }
        keys
    }

    fn role_table(&self) -> BTreeMap<Role, RoleKeys> {
        let mut roles = BTreeMap::new();
        roles.insert(
            Role::Root,
            RoleKeys {
                key_ids: self.root.iter().map(|k| k.key_id()).collect(),
                threshold: self.root_threshold,
            },
        );
        for (role, key) in [
            (Role::Targets, self.targets),
            (Role::Snapshot, self.snapshot),
            (Role::Timestamp, self.timestamp),
        ] {
            roles.insert(
                role,
                RoleKeys {
                    key_ids: vec![key.key_id()],
                    threshold: 1,
                },
            );
        }
        roles
    }
}

/// Builds and signs metadata documents with configured lifetimes
#[derive(Debug, Clone, Default)]
pub struct MetadataBuilder {
    lifetimes: RoleLifetimes,
}

impl MetadataBuilder {
    /// A builder with the default per-role lifetimes
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder with custom per-role lifetimes
    pub fn with_lifetimes(lifetimes: RoleLifetimes) -> Self {
        Self { lifetimes }
    }

    /// The configured lifetimes
    pub fn lifetimes(&self) -> &RoleLifetimes {
        &self.lifetimes
    }

    fn expires(&self, role: Role, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.lifetimes.get(role)
    }

    /// Build and sign a root document at the given version
    pub fn build_root(
        &self,
        now: DateTime<Utc>,
        version: u64,
        keys: &RepositoryKeys<'_>,
    ) -> Result<SignedMetadata> {
        if keys.root.is_empty() || keys.root_threshold as usize > keys.root.len() {
            return Err(Error::InvalidThreshold {
                role: Role::Root,
                threshold: keys.root_threshold,
                keys: keys.root.len(),
            });
        }
        let payload = Payload::Root(RootPayload {
            version,
            expires: self.expires(Role::Root, now),
            keys: keys.key_table(),
            roles: keys.role_table(),
        });
        debug!(version, "signing root metadata");
        SignedMetadata::sign(payload, &keys.root)
    }

    /// Build and sign a targets document from the pending target set
    pub fn build_targets(
        &self,
        now: DateTime<Utc>,
        version: u64,
        targets: BTreeMap<String, Vec<BlobRef>>,
        key: &KeyPair,
    ) -> Result<SignedMetadata> {
        let payload = Payload::Targets(TargetsPayload {
            version,
            expires: self.expires(Role::Targets, now),
            targets,
        });
        debug!(version, "signing targets metadata");
        SignedMetadata::sign(payload, &[key])
    }

    /// Build and sign a snapshot document pinning the given targets document
    pub fn build_snapshot(
        &self,
        now: DateTime<Utc>,
        version: u64,
        targets_doc: &SignedMetadata,
        key: &KeyPair,
    ) -> Result<SignedMetadata> {
        if targets_doc.role() != Role::Targets {
            return Err(Error::WrongRole {
                expected: Role::Targets,
                found: targets_doc.role(),
            });
        }
        let payload = Payload::Snapshot(SnapshotPayload {
            version,
            expires: self.expires(Role::Snapshot, now),
            targets: MetaPin::for_document(targets_doc)?,
        });
        debug!(version, "signing snapshot metadata");
        SignedMetadata::sign(payload, &[key])
    }

    /// Build and sign a timestamp document pinning the given snapshot document
    pub fn build_timestamp(
        &self,
        now: DateTime<Utc>,
        version: u64,
        snapshot_doc: &SignedMetadata,
        key: &KeyPair,
    ) -> Result<SignedMetadata> {
        if snapshot_doc.role() != Role::Snapshot {
            return Err(Error::WrongRole {
                expected: Role::Snapshot,
                found: snapshot_doc.role(),
            });
        }
        let payload = Payload::Timestamp(TimestampPayload {
            version,
            expires: self.expires(Role::Timestamp, now),
            snapshot: MetaPin::for_document(snapshot_doc)?,
        });
        debug!(version, "signing timestamp metadata");
        SignedMetadata::sign(payload, &[key])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tufreg_crypto::Digest;

    struct TestKeys {
        root: KeyPair,
        targets: KeyPair,
        snapshot: KeyPair,
        timestamp: KeyPair,
    }

    impl TestKeys {
        fn generate() -> Self {
            Self {
                root: KeyPair::generate().unwrap(),
                targets: KeyPair::generate().unwrap(),
                snapshot: KeyPair::generate().unwrap(),
                timestamp: KeyPair::generate().unwrap(),
            }
        }

        fn repository_keys(&self) -> RepositoryKeys<'_> {
            RepositoryKeys::single(&self.root, &self.targets, &self.snapshot, &self.timestamp)
        }
    }

    #[test]
    fn test_build_full_chain() {
        let keys = TestKeys::generate();
        let builder = MetadataBuilder::new();
        let now = Utc::now();

        let root = builder.build_root(now, 1, &keys.repository_keys()).unwrap();
        assert_eq!(root.role(), Role::Root);
        assert_eq!(root.version(), 1);

        let mut targets = BTreeMap::new();
        targets.insert(
            "v1".to_string(),
            vec![BlobRef {
                digest: Digest::of(b"abc"),
                size: 3,
            }],
        );
        let targets_doc = builder
            .build_targets(now, 1, targets, &keys.targets)
            .unwrap();
        let snapshot_doc = builder
            .build_snapshot(now, 1, &targets_doc, &keys.snapshot)
            .unwrap();
        let timestamp_doc = builder
            .build_timestamp(now, 1, &snapshot_doc, &keys.timestamp)
            .unwrap();

        // Each parent pins its child exactly
        match (&snapshot_doc.signed, &timestamp_doc.signed) {
            (Payload::Snapshot(snap), Payload::Timestamp(ts)) => {
                assert_eq!(snap.targets, MetaPin::for_document(&targets_doc).unwrap());
                assert_eq!(ts.snapshot, MetaPin::for_document(&snapshot_doc).unwrap());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_expirations_follow_lifetimes() {
        let keys = TestKeys::generate();
        let builder = MetadataBuilder::new();
        let now = Utc::now();

        let root = builder.build_root(now, 1, &keys.repository_keys()).unwrap();
        assert_eq!(root.expires(), now + Role::Root.default_lifetime());

        let targets_doc = builder
            .build_targets(now, 1, BTreeMap::new(), &keys.targets)
            .unwrap();
        assert_eq!(targets_doc.expires(), now + Role::Targets.default_lifetime());
    }

    #[test]
    fn test_unsatisfiable_threshold_rejected() {
        let keys = TestKeys::generate();
        let mut repo_keys = keys.repository_keys();
        repo_keys.root_threshold = 2;
        let builder = MetadataBuilder::new();
        assert!(matches!(
            builder.build_root(Utc::now(), 1, &repo_keys),
            Err(Error::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn test_pin_requires_matching_role() {
        let keys = TestKeys::generate();
        let builder = MetadataBuilder::new();
        let now = Utc::now();

        let targets_doc = builder
            .build_targets(now, 1, BTreeMap::new(), &keys.targets)
            .unwrap();
        // A targets document is not a snapshot; refuse to pin it as one
        assert!(matches!(
            builder.build_timestamp(now, 1, &targets_doc, &keys.timestamp),
            Err(Error::WrongRole { .. })
        ));
    }
}
