//! Encrypted-at-rest key storage
//!
//! Private role keys live in a master-only directory, one JSON file per
//! role. When a password is supplied the PKCS#8 material is sealed with
//! AES-256-GCM under a PBKDF2-HMAC-SHA256 derived key; otherwise it is
//! stored plaintext at the caller's risk. The public half is always stored
//! in the clear so it can be exported without a password.

use std::fs;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use aws_lc_rs::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use aws_lc_rs::pbkdf2;
use aws_lc_rs::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::signing::{KeyPair, PublicKeyPem};

const PBKDF2_ITERATIONS: u32 = 600_000;
const SALT_LEN: usize = 16;

/// On-disk form of a stored role key
#[derive(Serialize, Deserialize)]
struct StoredKey {
    /// Signing scheme name
    scheme: String,
    /// Raw public key bytes, base64
    public_key: String,
    /// Whether `key` is AES-256-GCM sealed
    encrypted: bool,
    /// PKCS#8 private key, base64; ciphertext + tag when encrypted
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    salt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    iterations: Option<u32>,
}

/// A directory of role key files
pub struct KeyStore {
    dir: PathBuf,
}

impl KeyStore {
    /// Create a key store rooted at the given directory
    ///
    /// The directory is created on first save.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// The key store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether a key with this name is stored
    pub fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    /// Persist a keypair, sealing the private half when a password is given
    pub fn save(&self, name: &str, keypair: &KeyPair, password: Option<&str>) -> Result<()> {
        use base64::Engine;
        let b64 = base64::engine::general_purpose::STANDARD;

        fs::create_dir_all(&self.dir)?;

        let stored = match password {
            Some(password) if !password.is_empty() => {
                let rng = SystemRandom::new();
                let mut salt = [0u8; SALT_LEN];
                rng.fill(&mut salt)?;
                let mut nonce_bytes = [0u8; NONCE_LEN];
                rng.fill(&mut nonce_bytes)?;

                let sealing = derive_key(password, &salt, PBKDF2_ITERATIONS)?;
                let mut in_out = keypair.pkcs8().to_vec();
                sealing.seal_in_place_append_tag(
                    Nonce::assume_unique_for_key(nonce_bytes),
                    Aad::empty(),
                    &mut in_out,
                )?;

                StoredKey {
                    scheme: keypair.scheme().name().to_string(),
                    public_key: b64.encode(keypair.public_key_bytes()),
                    encrypted: true,
                    key: b64.encode(&in_out),
                    salt: Some(b64.encode(salt)),
                    nonce: Some(b64.encode(nonce_bytes)),
                    iterations: Some(PBKDF2_ITERATIONS),
                }
            }
            _ => StoredKey {
                scheme: keypair.scheme().name().to_string(),
                public_key: b64.encode(keypair.public_key_bytes()),
                encrypted: false,
                key: b64.encode(keypair.pkcs8()),
                salt: None,
                nonce: None,
                iterations: None,
            },
        };

        let path = self.path(name);
        fs::write(&path, serde_json::to_vec_pretty(&stored)?)?;
        restrict_permissions(&path)?;
        debug!(key = name, encrypted = stored.encrypted, "stored role key");
        Ok(())
    }

    /// Load a keypair, unsealing with the password when required
    pub fn load(&self, name: &str, password: Option<&str>) -> Result<KeyPair> {
        use base64::Engine;
        let b64 = base64::engine::general_purpose::STANDARD;

        let stored: StoredKey = serde_json::from_slice(&fs::read(self.path(name))?)?;
        let key_bytes = b64.decode(&stored.key)?;

        let pkcs8 = if stored.encrypted {
            let password = password.filter(|p| !p.is_empty()).ok_or_else(|| {
                Error::Decrypt(format!("key {} is encrypted and needs a password", name))
            })?;
            let salt = b64.decode(stored.salt.as_deref().unwrap_or_default())?;
            let nonce = b64.decode(stored.nonce.as_deref().unwrap_or_default())?;
            let nonce: [u8; NONCE_LEN] = nonce
                .try_into()
                .map_err(|_| Error::Decrypt(format!("key {} has a malformed nonce", name)))?;
            let iterations = stored.iterations.unwrap_or(PBKDF2_ITERATIONS);

            let opening = derive_key(password, &salt, iterations)?;
            let mut in_out = key_bytes;
            let plaintext = opening
                .open_in_place(
                    Nonce::assume_unique_for_key(nonce),
                    Aad::empty(),
                    &mut in_out,
                )
                .map_err(|_| {
                    Error::Decrypt(format!(
                        "key {}: wrong password or corrupted key file",
                        name
                    ))
                })?;
            Zeroizing::new(plaintext.to_vec())
        } else {
            Zeroizing::new(key_bytes)
        };

        KeyPair::from_pkcs8(&pkcs8)
    }

    /// Export a stored key's public half as PEM without needing a password
    pub fn public_key_pem(&self, name: &str) -> Result<PublicKeyPem> {
        use base64::Engine;
        let stored: StoredKey = serde_json::from_slice(&fs::read(self.path(name))?)?;
        let public = base64::engine::general_purpose::STANDARD.decode(&stored.public_key)?;
        PublicKeyPem::from_public_key_bytes(&public)
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.key", name))
    }
}

fn derive_key(password: &str, salt: &[u8], iterations: u32) -> Result<LessSafeKey> {
    let iterations = NonZeroU32::new(iterations)
        .ok_or_else(|| Error::Decrypt("iteration count must be nonzero".to_string()))?;
    let mut derived = Zeroizing::new([0u8; 32]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        password.as_bytes(),
        derived.as_mut(),
    );
    Ok(LessSafeKey::new(UnboundKey::new(
        &AES_256_GCM,
        derived.as_ref(),
    )?))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plaintext_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        let kp = KeyPair::generate().unwrap();

        store.save("targets", &kp, None).unwrap();
        assert!(store.exists("targets"));
        assert!(!store.exists("root"));

        let loaded = store.load("targets", None).unwrap();
        assert_eq!(loaded.key_id(), kp.key_id());
    }

    #[test]
    fn test_encrypted_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        let kp = KeyPair::generate().unwrap();

        store.save("root", &kp, Some("hunter2")).unwrap();
        let loaded = store.load("root", Some("hunter2")).unwrap();
        assert_eq!(loaded.key_id(), kp.key_id());
    }

    #[test]
    fn test_wrong_password_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        let kp = KeyPair::generate().unwrap();

        store.save("root", &kp, Some("hunter2")).unwrap();
        assert!(matches!(
            store.load("root", Some("letmein")),
            Err(Error::Decrypt(_))
        ));
        assert!(matches!(store.load("root", None), Err(Error::Decrypt(_))));
    }

    #[test]
    fn test_public_key_without_password() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::new(dir.path());
        let kp = KeyPair::generate().unwrap();

        store.save("root", &kp, Some("hunter2")).unwrap();
        let pem = store.public_key_pem("root").unwrap();
        assert_eq!(pem.to_public_key_bytes().unwrap(), kp.public_key_bytes());
    }
}
