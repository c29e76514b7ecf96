//! Cryptographic primitives for tufreg
//!
//! This crate provides content digests, role keypair generation, signing,
//! verification, and encrypted-at-rest key storage using aws-lc-rs as the
//! cryptographic backend.

pub mod digest;
pub mod error;
pub mod keyring;
pub mod keystore;
pub mod signing;
pub mod verification;

pub use digest::{sha256, Digest, Sha256Hasher};
pub use error::{Error, Result};
pub use keyring::Keyring;
pub use keystore::KeyStore;
pub use signing::{KeyPair, PublicKeyPem, Signature, SigningScheme};
pub use verification::VerificationKey;
