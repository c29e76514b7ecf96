//! Signature verification using aws-lc-rs

use aws_lc_rs::signature::{UnparsedPublicKey, ED25519};

use crate::error::{Error, Result};
use crate::signing::SigningScheme;

/// A public key for verification
pub struct VerificationKey {
    /// Raw public key bytes
    pub bytes: Vec<u8>,
    /// The scheme to use for verification
    pub scheme: SigningScheme,
}

impl VerificationKey {
    /// Create a new verification key
    pub fn new(bytes: Vec<u8>, scheme: SigningScheme) -> Self {
        Self { bytes, scheme }
    }

    /// Verify a signature over data
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        match self.scheme {
            SigningScheme::Ed25519 => {
                let key = UnparsedPublicKey::new(&ED25519, &self.bytes);
                key.verify(data, signature)
                    .map_err(|_| Error::Verification("Ed25519 signature invalid".to_string()))
            }
        }
    }
}
