//! SHA-256 helpers.
//!
//! Store labels and bundle outputs are named by an [`ObjectHash`] of their
//! JSON form. Path inputs are pinned by a [`ContentHash`] over their tree, and
//! archive inputs by the digest of the downloaded bytes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::consts::OBJ_HASH_PREFIX_LEN;

pub type HashError = serde_json::Error;

/// Truncated digest of a serialized value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHash(pub String);

impl std::fmt::Display for ObjectHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<ObjectHash, HashError> {
    let serialized = serde_json::to_vec(self)?;
    let mut full = hash_bytes(&serialized).0;
    full.truncate(OBJ_HASH_PREFIX_LEN);
    Ok(ObjectHash(full))
  }
}

/// Full hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, thiserror::Error)]
pub enum DirHashError {
  #[error("failed to walk {}", root.display())]
  Walk {
    root: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("failed to read {}", path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Digest of everything below `root`: relative paths, file contents and
/// symlink targets. Timestamps and permissions are ignored, so copies of the
/// same tree hash alike. Entries whose name is in `exclude` are skipped along
/// with their children.
pub fn hash_directory(root: &Path, exclude: &[&str]) -> Result<ContentHash, DirHashError> {
  let walker = WalkDir::new(root)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| e.file_name().to_str().is_none_or(|name| !exclude.contains(&name)));

  let mut hasher = Sha256::new();
  for entry in walker {
    let entry = entry.map_err(|source| DirHashError::Walk {
      root: root.to_path_buf(),
      source,
    })?;
    let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
    if rel.as_os_str().is_empty() {
      continue;
    }
    let rel = rel.to_string_lossy().replace('\\', "/");

    let read_err = |source: io::Error| DirHashError::Read {
      path: entry.path().to_path_buf(),
      source,
    };
    let file_type = entry.file_type();
    let line = if file_type.is_file() {
      format!("F:{}:{}", rel, hash_file(entry.path()).map_err(read_err)?.0)
    } else if file_type.is_dir() {
      format!("D:{}", rel)
    } else if file_type.is_symlink() {
      let target = fs::read_link(entry.path()).map_err(read_err)?;
      format!("L:{}:{}", rel, hash_bytes(target.to_string_lossy().as_bytes()).0)
    } else {
      continue;
    };
    hasher.update(line.as_bytes());
    hasher.update(b"\n");
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

pub fn hash_file(path: &Path) -> io::Result<ContentHash> {
  let mut hasher = Sha256::new();
  io::copy(&mut fs::File::open(path)?, &mut hasher)?;
  Ok(ContentHash(hex::encode(hasher.finalize())))
}

pub fn hash_bytes(data: &[u8]) -> ContentHash {
  ContentHash(hex::encode(Sha256::digest(data)))
}
