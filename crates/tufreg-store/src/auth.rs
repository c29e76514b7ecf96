//! Auth collaborator contract
//!
//! The engine treats authentication as an opaque exchange of credentials
//! for a scoped bearer token. How the token reaches the registry transport
//! is the implementation's business; [`crate::MemoryRegistry`] checks it
//! in-process.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::BoxFuture;

/// Username/password credentials
#[derive(Clone)]
pub struct Credentials {
    /// Account name
    pub username: String,
    /// Account password
    pub password: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Actions a token can be scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Read blobs and metadata
    Pull,
    /// Write blobs and metadata
    Push,
    /// Delete blobs
    Delete,
}

impl Action {
    /// The action name as used in token scopes
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Pull => "pull",
            Action::Push => "push",
            Action::Delete => "delete",
        }
    }
}

/// An opaque bearer token issued by the auth collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wrap a token string
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The token string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The auth collaborator contract
pub trait AuthProvider: Send + Sync {
    /// Exchange credentials for a token scoped to the requested actions
    ///
    /// An [`Error::Unauthorized`] outcome is surfaced to the caller and
    /// never retried by the engine.
    fn authenticate<'a>(
        &'a self,
        credentials: &'a Credentials,
        actions: &'a [Action],
    ) -> BoxFuture<'a, Result<BearerToken>>;
}

impl<T: AuthProvider + ?Sized> AuthProvider for Arc<T> {
    fn authenticate<'a>(
        &'a self,
        credentials: &'a Credentials,
        actions: &'a [Action],
    ) -> BoxFuture<'a, Result<BearerToken>> {
        (**self).authenticate(credentials, actions)
    }
}

/// In-process auth provider for tests and local tooling
///
/// Issues its fixed token to exactly one username/password pair and
/// rejects everything else.
pub struct MemoryAuth {
    credentials: Credentials,
    token: BearerToken,
}

impl MemoryAuth {
    /// An auth provider accepting the given credentials
    pub fn new(credentials: Credentials, token: BearerToken) -> Self {
        Self { credentials, token }
    }
}

impl AuthProvider for MemoryAuth {
    fn authenticate<'a>(
        &'a self,
        credentials: &'a Credentials,
        _actions: &'a [Action],
    ) -> BoxFuture<'a, Result<BearerToken>> {
        Box::pin(async move {
            if credentials.username == self.credentials.username
                && credentials.password == self.credentials.password
            {
                Ok(self.token.clone())
            } else {
                Err(Error::Unauthorized)
            }
        })
    }
}
