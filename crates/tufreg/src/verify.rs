//! The consumer-side pull state machine
//!
//! A pull walks a fixed sequence of states, each consuming the expected
//! version extracted from the previous state's verified payload, so no
//! step can be reordered or parallelized with its predecessor:
//!
//! ```text
//! BootstrapRoot -> FetchTimestamp -> FetchSnapshot -> FetchTargets
//!     -> Reconcile -> Commit -> Trusted
//! ```
//!
//! Any signature, threshold, expiration, or monotonicity failure moves to
//! the terminal `Rejected` state: the error propagates and the previously
//! committed baseline stays untouched.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use tufreg_crypto::PublicKeyPem;
use tufreg_metadata::{
    check_monotonic, check_pin, BlobRef, MetaPin, Payload, Role, SignedMetadata, TrustedRoot,
};
use tufreg_store::Registry;

use crate::baseline::TrustBaseline;
use crate::error::{Error, Result};

/// The difference between the previous and newly trusted target sets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetDiff {
    /// Names present now but not before
    pub added: Vec<String>,
    /// Names present before and now, with different blob lists
    pub changed: Vec<String>,
    /// Names present before but not now
    pub removed: Vec<String>,
}

impl TargetDiff {
    /// Whether the trusted target set changed at all
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Names that were added or changed, in order
    pub fn updated(&self) -> impl Iterator<Item = &str> {
        self.added
            .iter()
            .chain(self.changed.iter())
            .map(String::as_str)
    }
}

/// States of one pull operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PullState {
    BootstrapRoot,
    FetchTimestamp,
    FetchSnapshot,
    FetchTargets,
    Reconcile,
    Commit,
    Trusted,
}

/// Drives one pull against the registry and the local trust baseline
pub(crate) struct ChainVerifier<'a> {
    registry: &'a dyn Registry,
    baseline_path: PathBuf,
    baseline: TrustBaseline,
    pinned_root: Option<&'a PublicKeyPem>,
    now: DateTime<Utc>,

    root: Option<TrustedRoot>,
    new_root: Option<SignedMetadata>,
    new_timestamp: Option<SignedMetadata>,
    new_snapshot: Option<SignedMetadata>,
    new_targets: Option<SignedMetadata>,
    diff: Option<TargetDiff>,
}

impl<'a> ChainVerifier<'a> {
    pub fn new(
        registry: &'a dyn Registry,
        baseline_path: PathBuf,
        baseline: TrustBaseline,
        pinned_root: Option<&'a PublicKeyPem>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            registry,
            baseline_path,
            baseline,
            pinned_root,
            now,
            root: None,
            new_root: None,
            new_timestamp: None,
            new_snapshot: None,
            new_targets: None,
            diff: None,
        }
    }

    /// Run the machine to a terminal state
    pub async fn run(mut self) -> Result<TargetDiff> {
        let mut state = PullState::BootstrapRoot;
        loop {
            debug!(state = ?state, "pull state");
            state = match state {
                PullState::BootstrapRoot => {
                    self.bootstrap_root().await?;
                    PullState::FetchTimestamp
                }
                PullState::FetchTimestamp => {
                    self.fetch_timestamp().await?;
                    PullState::FetchSnapshot
                }
                PullState::FetchSnapshot => {
                    self.fetch_snapshot().await?;
                    PullState::FetchTargets
                }
                PullState::FetchTargets => {
                    self.fetch_targets().await?;
                    PullState::Reconcile
                }
                PullState::Reconcile => {
                    self.reconcile();
                    PullState::Commit
                }
                PullState::Commit => {
                    self.commit()?;
                    PullState::Trusted
                }
                PullState::Trusted => {
                    return Ok(self.diff.take().unwrap_or_default());
                }
            };
        }
    }

    fn trusted_root(&self) -> Result<&TrustedRoot> {
        // Set by bootstrap_root, the first state of every run
        self.root.as_ref().ok_or_else(|| {
            Error::InvalidArgument("pull state machine entered a fetch state without a root".into())
        })
    }

    async fn fetch_document(&self, role: Role) -> Result<SignedMetadata> {
        let bytes = self.registry.get_metadata(role.name()).await?;
        Ok(SignedMetadata::from_bytes(&bytes)?)
    }

    /// Establish the trusted root: from the pinned public key on first use
    /// or re-pin, otherwise from the previously committed baseline.
    async fn bootstrap_root(&mut self) -> Result<()> {
        match self.pinned_root {
            Some(pinned) => {
                let keyid = pinned.key_id()?;
                let doc = self.fetch_document(Role::Root).await?;
                let candidate =
                    TrustedRoot::verify_self_signed(&doc, self.now)?;
                candidate.require_root_key(&keyid)?;
                check_monotonic(
                    Role::Root,
                    self.baseline.version(Role::Root),
                    doc.version(),
                )?;

                info!(version = doc.version(), "pinned new trusted root");
                self.root = Some(candidate);
                self.new_root = Some(doc);
            }
            None => {
                let doc = self
                    .baseline
                    .root
                    .as_ref()
                    .ok_or_else(|| {
                        Error::InvalidArgument(
                            "no previously trusted root; a pinned root public key is required"
                                .into(),
                        )
                    })?
                    .clone();
                if doc.expires() <= self.now {
                    return Err(Error::TrustChain(tufreg_metadata::Error::Expired {
                        role: Role::Root,
                        expires: doc.expires(),
                    }));
                }
                self.root = Some(TrustedRoot::from_document(&doc)?);
            }
        }
        Ok(())
    }

    /// Timestamp is the only role fetched without a known expected version
    async fn fetch_timestamp(&mut self) -> Result<()> {
        let doc = self.fetch_document(Role::Timestamp).await?;
        self.trusted_root()?
            .verify_document(Role::Timestamp, &doc, self.now)?;
        check_monotonic(
            Role::Timestamp,
            self.baseline.version(Role::Timestamp),
            doc.version(),
        )?;
        self.new_timestamp = Some(doc);
        Ok(())
    }

    fn timestamp_pin(&self) -> Result<MetaPin> {
        match self.new_timestamp.as_ref().map(|doc| &doc.signed) {
            Some(Payload::Timestamp(payload)) => Ok(payload.snapshot.clone()),
            _ => Err(Error::InvalidArgument(
                "pull state machine has no verified timestamp".into(),
            )),
        }
    }

    fn snapshot_pin(&self) -> Result<MetaPin> {
        match self.new_snapshot.as_ref().map(|doc| &doc.signed) {
            Some(Payload::Snapshot(payload)) => Ok(payload.targets.clone()),
            _ => Err(Error::InvalidArgument(
                "pull state machine has no verified snapshot".into(),
            )),
        }
    }

    /// Fetch and verify the document a parent pin demands, reusing the
    /// baseline copy when it already matches the pin exactly.
    async fn fetch_pinned(&self, role: Role, pin: &MetaPin) -> Result<SignedMetadata> {
        let reusable = self
            .baseline
            .document(role)
            .filter(|doc| check_pin(role, pin, doc).is_ok())
            .cloned();

        let doc = match reusable {
            Some(doc) => {
                debug!(role = %role, version = doc.version(), "reusing baseline document");
                doc
            }
            None => {
                let doc = self.fetch_document(role).await?;
                check_monotonic(role, self.baseline.version(role), doc.version())?;
                check_pin(role, pin, &doc)?;
                doc
            }
        };

        self.trusted_root()?
            .verify_document(role, &doc, self.now)?;
        Ok(doc)
    }

    async fn fetch_snapshot(&mut self) -> Result<()> {
        let pin = self.timestamp_pin()?;
        self.new_snapshot = Some(self.fetch_pinned(Role::Snapshot, &pin).await?);
        Ok(())
    }

    async fn fetch_targets(&mut self) -> Result<()> {
        let pin = self.snapshot_pin()?;
        self.new_targets = Some(self.fetch_pinned(Role::Targets, &pin).await?);
        Ok(())
    }

    /// Diff the newly trusted target set against the previous one
    fn reconcile(&mut self) {
        let old = self.baseline.targets_map();
        let new = match self.new_targets.as_ref().map(|doc| &doc.signed) {
            Some(Payload::Targets(payload)) => payload.targets.clone(),
            _ => BTreeMap::<String, Vec<BlobRef>>::new(),
        };

        let mut diff = TargetDiff::default();
        for (name, blobs) in &new {
            match old.get(name) {
                None => diff.added.push(name.clone()),
                Some(old_blobs) if old_blobs != blobs => diff.changed.push(name.clone()),
                Some(_) => {}
            }
        }
        for name in old.keys() {
            if !new.contains_key(name) {
                diff.removed.push(name.clone());
            }
        }
        self.diff = Some(diff);
    }

    /// Persist the whole verified chain as the new baseline, atomically
    fn commit(&mut self) -> Result<()> {
        let baseline = TrustBaseline {
            root: self.new_root.take().or_else(|| self.baseline.root.take()),
            timestamp: self.new_timestamp.take(),
            snapshot: self.new_snapshot.take(),
            targets: self.new_targets.take(),
        };
        baseline.store(&self.baseline_path)?;
        info!(
            timestamp = baseline.version(Role::Timestamp),
            snapshot = baseline.version(Role::Snapshot),
            targets = baseline.version(Role::Targets),
            "committed trust baseline"
        );
        Ok(())
    }
}
