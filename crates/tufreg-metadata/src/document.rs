//! Signed metadata documents
//!
//! A metadata document is a role-tagged payload carrying a strictly
//! increasing version and an expiration, wrapped in an envelope with one or
//! more signatures over the payload's canonical JSON form.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tufreg_crypto::{Digest, KeyPair, SigningScheme, VerificationKey};

use crate::canonical::to_canonical_json;
use crate::error::{Error, Result};
use crate::role::Role;

/// A public key entry in the root document's key table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpec {
    /// Signing scheme name (currently always `ed25519`)
    pub scheme: String,
    /// Raw public key bytes, base64
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
}

impl KeySpec {
    /// Build a key spec from a keypair's public half
    pub fn from_keypair(keypair: &KeyPair) -> Self {
        Self {
            scheme: keypair.scheme().name().to_string(),
            public_key: keypair.public_key_bytes().to_vec(),
        }
    }

    /// The verification half of this key
    pub fn verification_key(&self) -> Result<VerificationKey> {
        let scheme = SigningScheme::from_name(&self.scheme)?;
        Ok(VerificationKey::new(self.public_key.clone(), scheme))
    }
}

/// The keys authorized for one role, with a signing threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleKeys {
    /// Ids of authorized keys (entries in the root key table)
    pub key_ids: Vec<String>,
    /// Minimum number of distinct valid signatures required
    pub threshold: u32,
}

/// A reference to one content-addressed blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    /// Content digest; the sole identity of the blob
    pub digest: Digest,
    /// Declared size in bytes
    pub size: u64,
}

/// A pin of an exact child document: version, canonical-bytes digest, length
///
/// Snapshot pins targets this way, and timestamp pins snapshot. The verifier
/// rejects any fetched document that disagrees with its parent's pin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaPin {
    /// Pinned document version
    pub version: u64,
    /// SHA-256 of the pinned document's canonical bytes
    pub digest: Digest,
    /// Length of the pinned document's canonical bytes
    pub length: u64,
}

impl MetaPin {
    /// Pin a signed document by its canonical bytes
    pub fn for_document(doc: &SignedMetadata) -> Result<Self> {
        let bytes = doc.to_bytes()?;
        Ok(Self {
            version: doc.version(),
            digest: Digest::of(&bytes),
            length: bytes.len() as u64,
        })
    }
}

/// Root payload: the key table and per-role authorizations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootPayload {
    /// Strictly increasing root document version
    pub version: u64,
    /// Expiration of this document
    pub expires: DateTime<Utc>,
    /// All known keys, by key id
    pub keys: BTreeMap<String, KeySpec>,
    /// Authorized key ids and threshold per role
    pub roles: BTreeMap<Role, RoleKeys>,
}

/// Targets payload: the trusted target records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetsPayload {
    /// Strictly increasing targets document version
    pub version: u64,
    /// Expiration of this document
    pub expires: DateTime<Utc>,
    /// Target name to blob references
    pub targets: BTreeMap<String, Vec<BlobRef>>,
}

/// Snapshot payload: pins the exact targets document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    /// Strictly increasing snapshot document version
    pub version: u64,
    /// Expiration of this document
    pub expires: DateTime<Utc>,
    /// Pin of the targets document
    pub targets: MetaPin,
}

/// Timestamp payload: pins the exact snapshot document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampPayload {
    /// Strictly increasing timestamp document version
    pub version: u64,
    /// Expiration of this document
    pub expires: DateTime<Utc>,
    /// Pin of the snapshot document
    pub snapshot: MetaPin,
}

/// The role-tagged payload of a metadata document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename_all = "lowercase")]
pub enum Payload {
    /// Root of trust
    Root(RootPayload),
    /// Target records
    Targets(TargetsPayload),
    /// Pin of targets
    Snapshot(SnapshotPayload),
    /// Pin of snapshot
    Timestamp(TimestampPayload),
}

impl Payload {
    /// The role this payload belongs to
    pub fn role(&self) -> Role {
        match self {
            Payload::Root(_) => Role::Root,
            Payload::Targets(_) => Role::Targets,
            Payload::Snapshot(_) => Role::Snapshot,
            Payload::Timestamp(_) => Role::Timestamp,
        }
    }

    /// The document version
    pub fn version(&self) -> u64 {
        match self {
            Payload::Root(p) => p.version,
            Payload::Targets(p) => p.version,
            Payload::Snapshot(p) => p.version,
            Payload::Timestamp(p) => p.version,
        }
    }

    /// The document expiration
    pub fn expires(&self) -> DateTime<Utc> {
        match self {
            Payload::Root(p) => p.expires,
            Payload::Targets(p) => p.expires,
            Payload::Snapshot(p) => p.expires,
            Payload::Timestamp(p) => p.expires,
        }
    }
}

/// A signature over a payload's canonical bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Id of the signing key
    pub keyid: String,
    /// Raw signature bytes, base64
    #[serde(with = "base64_bytes")]
    pub sig: Vec<u8>,
}

/// A signed metadata document: payload plus signatures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMetadata {
    /// The role-tagged payload
    pub signed: Payload,
    /// Signatures over the payload's canonical bytes
    pub signatures: Vec<Signature>,
}

impl SignedMetadata {
    /// Sign a payload with the given keys
    pub fn sign(payload: Payload, keys: &[&KeyPair]) -> Result<Self> {
        let bytes = to_canonical_json(&payload)?;
        let signatures = keys
            .iter()
            .map(|key| {
                Ok(Signature {
                    keyid: key.key_id(),
                    sig: key.sign(&bytes)?.into_bytes(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            signed: payload,
            signatures,
        })
    }

    /// The canonical bytes the signatures cover
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        to_canonical_json(&self.signed)
    }

    /// Serialize the whole document to its canonical wire bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        to_canonical_json(self)
    }

    /// Parse a document from wire bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// The role of the signed payload
    pub fn role(&self) -> Role {
        self.signed.role()
    }

    /// The document version
    pub fn version(&self) -> u64 {
        self.signed.version()
    }

    /// The document expiration
    pub fn expires(&self) -> DateTime<Utc> {
        self.signed.expires()
    }
}

/// Serde helper for base64 encoding/decoding of byte arrays
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
