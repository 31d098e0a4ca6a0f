//! Content-addressed input store.
//!
//! Fetched inputs are materialised into a store directory named after what
//! they contain, so the same URL and revision always land in the same place:
//!
//! ```text
//! ~/.cache/envpin/store/inputs/
//!   nixpkgs-a1b2c3d4/          # {name}-{sha256(url:rev)[:8]}
//!     envpin.lua
//!     bin/
//!   rust-overlay-e5f6a7b8/
//!     envpin.lua
//! ```
//!
//! Entries are written to a staging directory inside the store and renamed
//! into place once complete. An entry that exists is therefore complete and
//! is reused without touching the network.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, trace};

use crate::platform::paths::{downloads_dir, git_cache_dir, store_dir};

/// Length of hash suffix used in store directory names.
const STORE_HASH_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("failed to create directory '{path}': {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to move '{from}' into the store at '{to}': {source}")]
  Install {
    from: PathBuf,
    to: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// The input store manager.
#[derive(Debug, Clone)]
pub struct InputStore {
  store_dir: PathBuf,
}

impl Default for InputStore {
  fn default() -> Self {
    Self::new()
  }
}

impl InputStore {
  /// Create a new input store using the default cache directory.
  pub fn new() -> Self {
    Self {
      store_dir: store_dir().join("inputs"),
    }
  }

  /// Create a new input store with a custom base path.
  pub fn with_path(store_dir: PathBuf) -> Self {
    Self { store_dir }
  }

  pub fn store_dir(&self) -> &Path {
    &self.store_dir
  }

  pub fn ensure_store_dir(&self) -> Result<(), StoreError> {
    if !self.store_dir.exists() {
      fs::create_dir_all(&self.store_dir).map_err(|e| StoreError::CreateDir {
        path: self.store_dir.clone(),
        source: e,
      })?;
    }
    Ok(())
  }

  /// Compute the store path for an input: `{store_dir}/{name}-{hash[:8]}`.
  pub fn compute_store_path(&self, name: &str, url: &str, rev: &str) -> PathBuf {
    self.store_dir.join(compute_store_label(name, url, rev))
  }

  /// Get the path to an existing store entry, or None if it doesn't exist.
  pub fn get(&self, name: &str, url: &str, rev: &str) -> Option<PathBuf> {
    let path = self.compute_store_path(name, url, rev);
    if path.is_dir() { Some(path) } else { None }
  }

  /// Create an empty staging directory inside the store.
  ///
  /// Staging lives on the same filesystem as the final entry so
  /// [`InputStore::install`] is a rename.
  pub fn stage(&self) -> Result<TempDir, StoreError> {
    self.ensure_store_dir()?;
    tempfile::Builder::new()
      .prefix(".staging-")
      .tempdir_in(&self.store_dir)
      .map_err(|e| StoreError::CreateDir {
        path: self.store_dir.clone(),
        source: e,
      })
  }

  /// Move a staged directory to its final store path.
  ///
  /// If the entry appeared in the meantime the staged copy is discarded.
  pub fn install(&self, staging: TempDir, dest: &Path) -> Result<PathBuf, StoreError> {
    if dest.is_dir() {
      trace!(path = %dest.display(), "store entry already present");
      return Ok(dest.to_path_buf());
    }

    fs::rename(staging.path(), dest).map_err(|e| StoreError::Install {
      from: staging.path().to_path_buf(),
      to: dest.to_path_buf(),
      source: e,
    })?;

    debug!(path = %dest.display(), "installed store entry");
    Ok(dest.to_path_buf())
  }
}

/// Compute the store label for an input: `{name}-{hash[:8]}`.
///
/// Input paths such as `rust-overlay/nixpkgs` are flattened to their last
/// segment.
pub fn compute_store_label(name: &str, url: &str, rev: &str) -> String {
  let short_name = name.rsplit('/').next().unwrap_or(name);
  format!("{}-{}", short_name, compute_input_hash(url, rev))
}

/// Returns the first 8 characters of SHA-256(`url + ":" + rev`).
fn compute_input_hash(url: &str, rev: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  hasher.update(b":");
  hasher.update(rev.as_bytes());
  let full = hex::encode(hasher.finalize());
  full[..STORE_HASH_LEN].to_string()
}

/// Locations used while fetching inputs.
#[derive(Debug, Clone)]
pub struct InputCache {
  /// Clones of git inputs, reused across fetches.
  pub git_dir: PathBuf,
  /// Downloaded archives.
  pub downloads_dir: PathBuf,
  /// Materialised inputs.
  pub store: InputStore,
}

impl Default for InputCache {
  fn default() -> Self {
    Self {
      git_dir: git_cache_dir(),
      downloads_dir: downloads_dir(),
      store: InputStore::new(),
    }
  }
}

impl InputCache {
  /// Keep every cache location below `root`.
  pub fn at(root: &Path) -> Self {
    Self {
      git_dir: root.join("git"),
      downloads_dir: root.join("downloads"),
      store: InputStore::with_path(root.join("store").join("inputs")),
    }
  }
}
