//! Persisted trust baseline
//!
//! The consumer's last verified metadata set, stored as a single JSON file
//! so a commit is one atomic temp-file rename: either the whole chain
//! lands or none of it does.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use tufreg_metadata::{BlobRef, Payload, Role, SignedMetadata};

use crate::error::Result;

/// The last verified metadata documents, by role
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct TrustBaseline {
    pub root: Option<SignedMetadata>,
    pub timestamp: Option<SignedMetadata>,
    pub snapshot: Option<SignedMetadata>,
    pub targets: Option<SignedMetadata>,
}

impl TrustBaseline {
    /// Load the baseline, empty if none has been committed yet
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically replace the stored baseline
    pub fn store(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// The trusted version of a role's document, if one is held
    pub fn version(&self, role: Role) -> Option<u64> {
        self.document(role).map(|doc| doc.version())
    }

    /// The trusted document for a role, if one is held
    pub fn document(&self, role: Role) -> Option<&SignedMetadata> {
        match role {
            Role::Root => self.root.as_ref(),
            Role::Timestamp => self.timestamp.as_ref(),
            Role::Snapshot => self.snapshot.as_ref(),
            Role::Targets => self.targets.as_ref(),
        }
    }

    /// The trusted target records; empty when no targets document is held
    pub fn targets_map(&self) -> BTreeMap<String, Vec<BlobRef>> {
        match self.targets.as_ref().map(|doc| &doc.signed) {
            Some(Payload::Targets(payload)) => payload.targets.clone(),
            _ => BTreeMap::new(),
        }
    }
}
