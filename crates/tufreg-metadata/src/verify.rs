//! Chain verification rules
//!
//! Pure checks applied by the consumer: signature thresholds against the
//! trusted root's authorized keys, expiration, version monotonicity, and
//! parent pins. Fetching and baseline persistence are the engine's job;
//! everything here takes documents that are already in memory.

use chrono::{DateTime, Utc};
use tracing::debug;

use tufreg_crypto::Keyring;

use crate::document::{MetaPin, Payload, RoleKeys, RootPayload, SignedMetadata};
use crate::error::{Error, Result};
use crate::role::Role;

/// A verified root document, the anchor for verifying every other role
pub struct TrustedRoot {
    payload: RootPayload,
}

impl TrustedRoot {
    /// Adopt a root document's payload without checking its signatures
    ///
    /// Only for a baseline that was already verified when it was committed.
    pub fn from_document(doc: &SignedMetadata) -> Result<Self> {
        match &doc.signed {
            Payload::Root(payload) => Ok(Self {
                payload: payload.clone(),
            }),
            other => Err(Error::WrongRole {
                expected: Role::Root,
                found: other.role(),
            }),
        }
    }

    /// Verify a candidate root document against its own declared key set
    ///
    /// A root document is self-signed: it must carry a threshold of valid
    /// signatures from the root keys it itself lists. Pin checking against
    /// an out-of-band public key is a separate step
    /// ([`TrustedRoot::require_root_key`]).
    pub fn verify_self_signed(doc: &SignedMetadata, now: DateTime<Utc>) -> Result<Self> {
        let candidate = Self::from_document(doc)?;
        candidate.verify_document(Role::Root, doc, now)?;
        Ok(candidate)
    }

    /// The root payload
    pub fn payload(&self) -> &RootPayload {
        &self.payload
    }

    /// The root document version
    pub fn version(&self) -> u64 {
        self.payload.version
    }

    /// The authorized keys and threshold for a role
    pub fn authorized(&self, role: Role) -> Result<&RoleKeys> {
        self.payload.roles.get(&role).ok_or_else(|| {
            Error::InconsistentReference {
                role,
                detail: "root document lists no keys for this role".to_string(),
            }
        })
    }

    /// Require that a specific key id is an authorized root key
    ///
    /// Used to bind a fetched root document to the out-of-band pinned
    /// public key during bootstrap.
    pub fn require_root_key(&self, keyid: &str) -> Result<()> {
        let authorized = self.authorized(Role::Root)?;
        if authorized.key_ids.iter().any(|id| id == keyid) {
            Ok(())
        } else {
            Err(Error::UnknownKey {
                role: Role::Root,
                keyid: keyid.to_string(),
            })
        }
    }

    /// Verify a document's signatures, threshold, and expiration for a role
    pub fn verify_document(
        &self,
        expected: Role,
        doc: &SignedMetadata,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if doc.role() != expected {
            return Err(Error::WrongRole {
                expected,
                found: doc.role(),
            });
        }

        let authorized = self.authorized(expected)?;
        self.verify_signatures(expected, authorized, doc)?;

        if doc.expires() <= now {
            return Err(Error::Expired {
                role: expected,
                expires: doc.expires(),
            });
        }

        debug!(role = %expected, version = doc.version(), "metadata verified");
        Ok(())
    }

    fn verify_signatures(
        &self,
        role: Role,
        authorized: &RoleKeys,
        doc: &SignedMetadata,
    ) -> Result<()> {
        let bytes = doc.signing_bytes()?;

        let mut keyring = Keyring::new();
        for keyid in &authorized.key_ids {
            if let Some(spec) = self.payload.keys.get(keyid) {
                keyring.add_key(keyid.clone(), spec.verification_key()?);
            }
        }

        // Distinct authorized keys with a valid signature; a second
        // signature from the same key does not count twice.
        let mut valid: Vec<&str> = Vec::new();
        let mut bad_authorized_sig: Option<&str> = None;
        for signature in &doc.signatures {
            if !keyring.contains(&signature.keyid) {
                continue;
            }
            if valid.iter().any(|id| *id == signature.keyid) {
                continue;
            }
            match keyring.verify_with_key_id(&signature.keyid, &bytes, &signature.sig) {
                Ok(()) => valid.push(&signature.keyid),
                Err(_) => bad_authorized_sig = Some(&signature.keyid),
            }
        }

        if valid.len() >= authorized.threshold as usize {
            return Ok(());
        }
        if let Some(keyid) = bad_authorized_sig {
            return Err(Error::BadSignature {
                role,
                keyid: keyid.to_string(),
            });
        }
        Err(Error::ThresholdNotMet {
            role,
            valid: valid.len(),
            threshold: authorized.threshold,
        })
    }
}

/// Reject a fetched document older than the trusted baseline
pub fn check_monotonic(role: Role, trusted: Option<u64>, fetched: u64) -> Result<()> {
    match trusted {
        Some(trusted) if fetched < trusted => Err(Error::Rollback {
            role,
            trusted,
            fetched,
        }),
        _ => Ok(()),
    }
}

/// Check a fetched document against the pin its parent declared
pub fn check_pin(role: Role, pin: &MetaPin, doc: &SignedMetadata) -> Result<()> {
    if doc.version() != pin.version {
        return Err(Error::InconsistentReference {
            role,
            detail: format!(
                "parent pinned version {}, document is version {}",
                pin.version,
                doc.version()
            ),
        });
    }
    let actual = MetaPin::for_document(doc)?;
    if actual.digest != pin.digest || actual.length != pin.length {
        return Err(Error::InconsistentReference {
            role,
            detail: format!(
                "parent pinned digest {}, document bytes are {}",
                pin.digest, actual.digest
            ),
        });
    }
    Ok(())
}
