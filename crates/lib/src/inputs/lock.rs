//! Lock file management for input resolution.
//!
//! The lock file (`envpin.lock`) pins every input in the dependency graph,
//! transitive inputs included, so evaluation is reproducible. It lives next to
//! the descriptor.
//!
//! # Lock File Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "root": "root",
//!   "nodes": {
//!     "root": { "inputs": { "nixpkgs": "nixpkgs", "rust-overlay": "rust-overlay" } },
//!     "nixpkgs": { "type": "git", "url": "git:https://...", "rev": "a1b2c3...", "lastModified": 1733667300 },
//!     "rust-overlay": {
//!       "type": "git", "url": "git:https://...", "rev": "d4e5f6...",
//!       "inputs": { "nixpkgs": ["nixpkgs"] }
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use super::types::{LockNode, LockRef};

/// Current lock file format version.
pub const LOCK_VERSION: u32 = 1;

/// Lock file name.
pub const LOCK_FILENAME: &str = "envpin.lock";

/// Key of the root node.
pub const ROOT_NODE: &str = "root";

/// A lock file containing the pinned input graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockFile {
  /// Lock file format version.
  pub version: u32,
  /// Key of the root node in `nodes`.
  pub root: String,
  /// Graph nodes keyed by their input path.
  pub nodes: BTreeMap<String, LockNode>,
}

/// Errors that can occur when working with lock files.
#[derive(Debug, Error)]
pub enum LockError {
  #[error("failed to read lock file: {0}")]
  Read(#[source] io::Error),

  #[error("failed to write lock file: {0}")]
  Write(#[source] io::Error),

  #[error("failed to parse lock file: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize lock file: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("unsupported lock file version {0}, expected {LOCK_VERSION}")]
  UnsupportedVersion(u32),

  /// The `root` key names a node that is not in the file.
  #[error("lock file root node '{0}' is missing")]
  MissingRoot(String),
}

impl Default for LockFile {
  fn default() -> Self {
    Self::new()
  }
}

impl LockFile {
  /// Create a new lock file holding only an empty root node.
  pub fn new() -> Self {
    let mut nodes = BTreeMap::new();
    nodes.insert(ROOT_NODE.to_string(), LockNode::root(BTreeMap::new()));
    Self {
      version: LOCK_VERSION,
      root: ROOT_NODE.to_string(),
      nodes,
    }
  }

  /// Load a lock file from the given path.
  ///
  /// Returns `Ok(None)` if the file doesn't exist.
  pub fn load(path: &Path) -> Result<Option<Self>, LockError> {
    let content = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(LockError::Read(e)),
    };

    let lock: LockFile = serde_json::from_str(&content).map_err(LockError::Parse)?;

    if lock.version != LOCK_VERSION {
      return Err(LockError::UnsupportedVersion(lock.version));
    }
    if !lock.nodes.contains_key(&lock.root) {
      return Err(LockError::MissingRoot(lock.root));
    }

    Ok(Some(lock))
  }

  /// Save the lock file to the given path.
  ///
  /// The content goes to a temporary file in the same directory first and is
  /// renamed over `path`, so readers never observe a partial lock file.
  pub fn save(&self, path: &Path) -> Result<(), LockError> {
    let mut content = serde_json::to_string_pretty(self).map_err(LockError::Serialize)?;
    content.push('\n');

    let dir = match path.parent() {
      Some(parent) if !parent.as_os_str().is_empty() => parent,
      _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(LockError::Write)?;
    tmp.write_all(content.as_bytes()).map_err(LockError::Write)?;
    tmp.persist(path).map_err(|e| LockError::Write(e.error))?;
    Ok(())
  }

  /// Get a locked node by its input path.
  pub fn get(&self, path: &str) -> Option<&LockNode> {
    if path == self.root {
      return None;
    }
    self.nodes.get(path)
  }

  /// Insert or replace a node.
  pub fn insert(&mut self, path: String, node: LockNode) {
    self.nodes.insert(path, node);
  }

  /// The root node's input references.
  pub fn root_inputs(&self) -> BTreeMap<String, LockRef> {
    self
      .nodes
      .get(&self.root)
      .map(|n| n.inputs.clone())
      .unwrap_or_default()
  }

  /// Paths of all locked input nodes (the root excluded).
  pub fn input_paths(&self) -> Vec<&str> {
    self
      .nodes
      .keys()
      .filter(|k| **k != self.root)
      .map(|k| k.as_str())
      .collect()
  }
}
