//! Keyring for managing multiple verification keys
//!
//! A keyring holds the verification keys a trusted root document authorizes
//! for one role, indexed by key id. Threshold counting is done by the
//! metadata layer; the keyring answers the per-key question.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::verification::VerificationKey;

/// A keyring containing multiple verification keys
#[derive(Default)]
pub struct Keyring {
    /// Keys indexed by key id (hex SHA-256 of the public key)
    keys: HashMap<String, VerificationKey>,
}

impl Keyring {
    /// Create a new empty keyring
    pub fn new() -> Self {
        Self {
            keys: HashMap::new(),
        }
    }

    /// Add a key to the keyring
    pub fn add_key(&mut self, key_id: String, key: VerificationKey) {
        self.keys.insert(key_id, key);
    }

    /// Get a key by id
    pub fn get_key(&self, key_id: &str) -> Option<&VerificationKey> {
        self.keys.get(key_id)
    }

    /// Whether the keyring holds a key with this id
    pub fn contains(&self, key_id: &str) -> bool {
        self.keys.contains_key(key_id)
    }

    /// Verify a signature using a specific key id
    pub fn verify_with_key_id(&self, key_id: &str, data: &[u8], signature: &[u8]) -> Result<()> {
        let key = self
            .get_key(key_id)
            .ok_or_else(|| Error::Verification(format!("key not found: {}", key_id)))?;
        key.verify(data, signature)
    }

    /// Get the number of keys in the keyring
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if the keyring is empty
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::KeyPair;

    #[test]
    fn test_keyring_add_and_get() {
        let mut keyring = Keyring::new();
        let kp = KeyPair::generate().unwrap();
        keyring.add_key(kp.key_id(), kp.verification_key());
        assert_eq!(keyring.len(), 1);
        assert!(keyring.contains(&kp.key_id()));
    }

    #[test]
    fn test_keyring_verify_with_key_id() {
        let mut keyring = Keyring::new();
        let kp = KeyPair::generate().unwrap();
        keyring.add_key(kp.key_id(), kp.verification_key());

        let data = b"signed bytes";
        let sig = kp.sign(data).unwrap();

        assert!(keyring
            .verify_with_key_id(&kp.key_id(), data, sig.as_bytes())
            .is_ok());
        assert!(keyring
            .verify_with_key_id("0000", data, sig.as_bytes())
            .is_err());
    }
}
