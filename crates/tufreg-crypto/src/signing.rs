//! Role key generation and signing using aws-lc-rs
//!
//! Every metadata role signs with an Ed25519 keypair. Key ids are the hex
//! SHA-256 of the raw public key bytes, which is also how the root document
//! refers to authorized keys.

use aws_lc_rs::{
    rand::SystemRandom,
    signature::{Ed25519KeyPair, KeyPair as AwsKeyPair},
};
use zeroize::Zeroize;

use crate::digest::sha256;
use crate::error::{Error, Result};
use crate::verification::VerificationKey;

/// Supported signing schemes
///
/// A closed set: verification rejects any scheme it does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningScheme {
    /// Ed25519
    Ed25519,
}

impl SigningScheme {
    /// Get the name of this scheme as it appears in metadata documents
    pub fn name(&self) -> &'static str {
        match self {
            SigningScheme::Ed25519 => "ed25519",
        }
    }

    /// Parse a scheme name from a metadata document
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "ed25519" => Ok(SigningScheme::Ed25519),
            other => Err(Error::InvalidKeyFormat(format!(
                "unsupported signing scheme: {}",
                other
            ))),
        }
    }
}

/// A cryptographic signature produced by a role key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    /// Create a new Signature from raw bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get the raw signature bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume and return the inner bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Get the length of the signature in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the signature is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encode the signature as base64
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(&self.0)
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// An Ed25519 role keypair
///
/// Retains its PKCS#8 encoding so the key store can persist it (optionally
/// password-encrypted). The private material is zeroized on drop.
pub struct KeyPair {
    inner: Ed25519KeyPair,
    pkcs8: Vec<u8>,
}

impl KeyPair {
    /// Generate a new Ed25519 keypair
    pub fn generate() -> Result<Self> {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng)
            .map_err(|_| Error::KeyGeneration("failed to generate Ed25519 key".to_string()))?;
        let inner = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref())?;
        Ok(Self {
            inner,
            pkcs8: pkcs8.as_ref().to_vec(),
        })
    }

    /// Load a keypair from its PKCS#8 encoding
    pub fn from_pkcs8(bytes: &[u8]) -> Result<Self> {
        let inner = Ed25519KeyPair::from_pkcs8(bytes)?;
        Ok(Self {
            inner,
            pkcs8: bytes.to_vec(),
        })
    }

    /// The PKCS#8 encoding of the private key
    pub fn pkcs8(&self) -> &[u8] {
        &self.pkcs8
    }

    /// The raw public key bytes (32 bytes for Ed25519)
    pub fn public_key_bytes(&self) -> &[u8] {
        self.inner.public_key().as_ref()
    }

    /// The key id: hex SHA-256 of the raw public key bytes
    pub fn key_id(&self) -> String {
        hex::encode(sha256(self.public_key_bytes()))
    }

    /// The signing scheme of this keypair
    pub fn scheme(&self) -> SigningScheme {
        SigningScheme::Ed25519
    }

    /// Sign data with this keypair
    pub fn sign(&self, data: &[u8]) -> Result<Signature> {
        let sig = self.inner.sign(data);
        Ok(Signature::new(sig.as_ref().to_vec()))
    }

    /// The verification half of this keypair
    pub fn verification_key(&self) -> VerificationKey {
        VerificationKey::new(self.public_key_bytes().to_vec(), SigningScheme::Ed25519)
    }

    /// The public key in PEM-encoded SubjectPublicKeyInfo form
    ///
    /// This is the form distributed out of band to consumers for pinning.
    pub fn public_key_pem(&self) -> Result<PublicKeyPem> {
        PublicKeyPem::from_public_key_bytes(self.public_key_bytes())
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.pkcs8.zeroize();
    }
}

const ED25519_OID: const_oid::ObjectIdentifier =
    const_oid::ObjectIdentifier::new_unwrap("1.3.101.112");

/// A PEM-encoded Ed25519 public key (SubjectPublicKeyInfo)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyPem(String);

impl PublicKeyPem {
    /// Wrap an existing PEM string
    ///
    /// Note: this does not validate the PEM content; use
    /// [`PublicKeyPem::to_public_key_bytes`] to parse it.
    pub fn new(pem: String) -> Self {
        Self(pem)
    }

    /// Encode raw Ed25519 public key bytes as PEM
    pub fn from_public_key_bytes(bytes: &[u8]) -> Result<Self> {
        use der::asn1::BitString;
        use der::Encode;
        use spki::{AlgorithmIdentifier, SubjectPublicKeyInfo};

        let alg_id: AlgorithmIdentifier<der::Any> = AlgorithmIdentifier {
            oid: ED25519_OID,
            parameters: None,
        };

        let spki = SubjectPublicKeyInfo {
            algorithm: alg_id,
            subject_public_key: BitString::from_bytes(bytes)
                .map_err(|e| Error::Der(e.to_string()))?,
        };

        let der = spki.to_der().map_err(|e| Error::Der(e.to_string()))?;
        let pem = pem::Pem::new("PUBLIC KEY", der);
        Ok(PublicKeyPem(pem::encode(&pem)))
    }

    /// Parse back to raw Ed25519 public key bytes
    pub fn to_public_key_bytes(&self) -> Result<Vec<u8>> {
        use der::Decode;
        use spki::SubjectPublicKeyInfo;

        let parsed = pem::parse(&self.0).map_err(|e| Error::Pem(e.to_string()))?;
        let spki: SubjectPublicKeyInfo<der::Any, der::asn1::BitString> =
            SubjectPublicKeyInfo::from_der(parsed.contents())
                .map_err(|e| Error::Der(e.to_string()))?;

        if spki.algorithm.oid != ED25519_OID {
            return Err(Error::InvalidKeyFormat(format!(
                "not an Ed25519 public key (algorithm {})",
                spki.algorithm.oid
            )));
        }

        spki.subject_public_key
            .as_bytes()
            .map(|b| b.to_vec())
            .ok_or_else(|| Error::Der("public key bit string has unused bits".to_string()))
    }

    /// The key id of the encoded public key
    pub fn key_id(&self) -> Result<String> {
        Ok(hex::encode(sha256(&self.to_public_key_bytes()?)))
    }

    /// Get the PEM string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner PEM string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for PublicKeyPem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for PublicKeyPem {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate() {
        let kp = KeyPair::generate().unwrap();
        assert_eq!(kp.public_key_bytes().len(), 32);
        assert_eq!(kp.key_id().len(), 64);
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = KeyPair::generate().unwrap();
        let data = b"test data to sign";
        let sig = kp.sign(data).unwrap();
        assert_eq!(sig.len(), 64);
        assert!(kp.verification_key().verify(data, sig.as_bytes()).is_ok());
    }

    #[test]
    fn test_pkcs8_roundtrip() {
        let kp = KeyPair::generate().unwrap();
        let restored = KeyPair::from_pkcs8(kp.pkcs8()).unwrap();
        assert_eq!(kp.public_key_bytes(), restored.public_key_bytes());
        assert_eq!(kp.key_id(), restored.key_id());
    }

    #[test]
    fn test_public_key_pem_roundtrip() {
        let kp = KeyPair::generate().unwrap();
        let pem = kp.public_key_pem().unwrap();
        assert!(pem.as_str().contains("BEGIN PUBLIC KEY"));
        assert_eq!(pem.to_public_key_bytes().unwrap(), kp.public_key_bytes());
        assert_eq!(pem.key_id().unwrap(), kp.key_id());
    }

    #[test]
    fn test_scheme_names() {
        assert_eq!(SigningScheme::Ed25519.name(), "ed25519");
        assert_eq!(
            SigningScheme::from_name("ed25519").unwrap(),
            SigningScheme::Ed25519
        );
        assert!(SigningScheme::from_name("rsa").is_err());
    }
}
