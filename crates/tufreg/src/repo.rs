//! Per-repository context and locking
//!
//! Key material and trusted metadata are scoped to a repository identity
//! on disk; the context value carries that scope explicitly instead of any
//! process-global state. Layout under the repositories root:
//!
//! ```text
//! <root>/<repo>/master/keys/<role>.key     private role keys (master only)
//! <root>/<repo>/master/metadata/<role>.json  current signed documents
//! <root>/<repo>/copy/trusted.json          last verified trust baseline
//! <root>/<repo>/copy/.lock                 exclusive verification lock
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// The on-disk scope of one repository
#[derive(Debug, Clone)]
pub struct RepositoryContext {
    root: PathBuf,
    repo: String,
}

impl RepositoryContext {
    /// Create a context for `repo` under the repositories root directory
    pub fn new(root: impl AsRef<Path>, repo: impl Into<String>) -> Result<Self> {
        let repo = repo.into();
        if repo.is_empty()
            || repo
                .chars()
                .any(|c| std::path::is_separator(c) || c == '\0')
            || repo.starts_with('.')
        {
            return Err(Error::InvalidArgument(format!(
                "invalid repository name: {:?}",
                repo
            )));
        }
        Ok(Self {
            root: root.as_ref().to_path_buf(),
            repo,
        })
    }

    /// The repositories root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The repository name
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// This repository's directory
    pub fn repo_dir(&self) -> PathBuf {
        self.root.join(&self.repo)
    }

    pub(crate) fn master_keys_dir(&self) -> PathBuf {
        self.repo_dir().join("master").join("keys")
    }

    pub(crate) fn master_metadata_dir(&self) -> PathBuf {
        self.repo_dir().join("master").join("metadata")
    }

    pub(crate) fn copy_dir(&self) -> PathBuf {
        self.repo_dir().join("copy")
    }

    pub(crate) fn baseline_path(&self) -> PathBuf {
        self.copy_dir().join("trusted.json")
    }

    /// Take the exclusive per-repository verification lock
    ///
    /// Verification runs read the trust baseline at start and write it once
    /// at commit; a single writer at a time keeps commits from interleaving.
    /// A held lock fails fast with [`Error::RepositoryLocked`] so the caller
    /// decides whether to retry.
    pub(crate) fn lock_copy(&self) -> Result<RepositoryLock> {
        RepositoryLock::acquire(self.copy_dir().join(".lock"))
    }
}

/// An exclusive lock held for the duration of a verification run
///
/// Backed by a lock file created with `create_new`; removed on drop.
#[derive(Debug)]
pub(crate) struct RepositoryLock {
    path: PathBuf,
}

impl RepositoryLock {
    fn acquire(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => {
                debug!(path = %path.display(), "acquired repository lock");
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Error::RepositoryLocked)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for RepositoryLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_name_validation() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RepositoryContext::new(dir.path(), "app").is_ok());
        assert!(RepositoryContext::new(dir.path(), "").is_err());
        assert!(RepositoryContext::new(dir.path(), "a/b").is_err());
        assert!(RepositoryContext::new(dir.path(), "..").is_err());
    }

    #[test]
    fn test_layout_paths() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RepositoryContext::new(dir.path(), "app").unwrap();
        assert!(ctx.master_keys_dir().ends_with("app/master/keys"));
        assert!(ctx.baseline_path().ends_with("app/copy/trusted.json"));
    }

    #[test]
    fn test_lock_is_exclusive_and_released() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RepositoryContext::new(dir.path(), "app").unwrap();

        let lock = ctx.lock_copy().unwrap();
        assert!(matches!(ctx.lock_copy(), Err(Error::RepositoryLocked)));
        drop(lock);
        assert!(ctx.lock_copy().is_ok());
    }
}
