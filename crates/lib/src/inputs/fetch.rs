//! Git, path and archive retrieval for inputs.
//!
//! - Git inputs are cloned (or fetched) into the git cache, the requested
//!   revision is resolved to a commit, and that commit's tree is written into
//!   the input store.
//! - Path inputs are resolved in place with tilde expansion.
//! - Archive inputs are downloaded, identified by the SHA-256 of their bytes,
//!   and unpacked into the input store.
//!
//! A store entry for a pinned revision is reused as is, so resolving an
//! already locked graph needs no network access.

use std::fs;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use gix::objs::tree::EntryKind;
use gix::remote::Direction;
use tar::Archive;
use thiserror::Error;
use tracing::{debug, info, trace};

use super::store::{InputCache, StoreError, compute_store_label};
use crate::platform::paths::home_dir;
use crate::util::hash::{DirHashError, hash_bytes};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during fetch operations.
#[derive(Debug, Error)]
pub enum FetchError {
  #[error("failed to create cache directory '{0}': {1}")]
  CreateCacheDir(PathBuf, #[source] std::io::Error),

  #[error("failed to clone repository '{url}': {source}")]
  Clone {
    url: String,
    #[source]
    source: BoxError,
  },

  #[error("failed to open repository at '{path}': {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: Box<gix::open::Error>,
  },

  #[error("failed to fetch from '{url}': {source}")]
  Fetch {
    url: String,
    #[source]
    source: BoxError,
  },

  #[error("revision '{rev}' not found in repository")]
  RevisionNotFound { rev: String },

  #[error("failed to resolve HEAD: {0}")]
  ResolveHead(String),

  /// Failed to write a commit's tree into the store.
  #[error("failed to materialise revision '{rev}': {source}")]
  Materialise {
    rev: String,
    #[source]
    source: BoxError,
  },

  #[error("no remote configured for repository")]
  NoRemote,

  #[error("failed to connect to remote '{url}': {source}")]
  Connect {
    url: String,
    #[source]
    source: BoxError,
  },

  #[error("path does not exist: {0}")]
  PathNotFound(PathBuf),

  #[error("failed to resolve path '{path}': {source}")]
  CanonicalizePath {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to download '{url}': {source}")]
  Download {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  /// Downloaded archive does not match the pinned hash.
  #[error("hash mismatch for '{url}': expected {expected}, got {actual}")]
  HashMismatch {
    url: String,
    expected: String,
    actual: String,
  },

  #[error("failed to unpack archive '{url}': {source}")]
  Unpack {
    url: String,
    #[source]
    source: std::io::Error,
  },

  /// Failed to hash a path input.
  #[error("failed to hash '{path}': {source}")]
  Hash {
    path: PathBuf,
    #[source]
    source: DirHashError,
  },

  #[error(transparent)]
  Store(#[from] StoreError),
}

/// Fetch a git input and materialise the resolved commit into the store.
///
/// If `rev` is `None`, the remote's default branch is used.
///
/// # Arguments
///
/// * `name` - The input path (used for cache and store naming)
/// * `url` - The git URL (without scheme prefix, e.g., "https://github.com/org/repo.git")
/// * `rev` - Optional revision (commit hash, tag, or branch)
/// * `cache` - Cache locations
///
/// # Returns
///
/// A tuple of `(path, rev)` where `path` is the store entry holding the
/// commit's tree and `rev` is the full commit hash.
pub fn fetch_git(name: &str, url: &str, rev: Option<&str>, cache: &InputCache) -> Result<(PathBuf, String), FetchError> {
  if let Some(rev) = rev
    && is_commit_hash(rev)
    && let Some(path) = cache.store.get(name, url, rev)
  {
    debug!(name, rev, path = %path.display(), "using stored revision");
    return Ok((path, rev.to_string()));
  }

  if !cache.git_dir.exists() {
    fs::create_dir_all(&cache.git_dir).map_err(|e| FetchError::CreateCacheDir(cache.git_dir.clone(), e))?;
  }

  let repo_path = cache.git_dir.join(compute_store_label(name, url, "git"));

  let repo = if repo_path.join(".git").exists() {
    debug!(name, path = %repo_path.display(), "opening existing repository");
    let repo = gix::open(&repo_path).map_err(|e| FetchError::Open {
      path: repo_path.clone(),
      source: Box::new(e),
    })?;

    fetch_updates(&repo, url)?;
    repo
  } else {
    info!(name, url, path = %repo_path.display(), "cloning repository");
    clone_repo(url, &repo_path)?
  };

  let commit_hash = resolve_revision(&repo, rev)?;
  debug!(name, rev = %commit_hash, "resolved revision");

  if let Some(path) = cache.store.get(name, url, &commit_hash) {
    return Ok((path, commit_hash));
  }

  let dest = cache.store.compute_store_path(name, url, &commit_hash);
  let staging = cache.store.stage()?;
  materialise_commit(&repo, &commit_hash, staging.path())?;
  let path = cache.store.install(staging, &dest)?;

  info!(name, rev = %commit_hash, path = %path.display(), "materialised input");
  Ok((path, commit_hash))
}

/// Clone a git repository without checking out a worktree.
fn clone_repo(url: &str, dest: &Path) -> Result<gix::Repository, FetchError> {
  let mut prepared = gix::prepare_clone(url, dest).map_err(|e| FetchError::Clone {
    url: url.to_string(),
    source: Box::new(e),
  })?;

  let (repo, _outcome) = prepared
    .fetch_only(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| FetchError::Clone {
      url: url.to_string(),
      source: Box::new(e),
    })?;

  Ok(repo)
}

fn fetch_updates(repo: &gix::Repository, url: &str) -> Result<(), FetchError> {
  debug!(url, "fetching updates");

  let remote = repo
    .find_default_remote(Direction::Fetch)
    .ok_or(FetchError::NoRemote)?
    .map_err(|e| FetchError::Connect {
      url: url.to_string(),
      source: Box::new(e),
    })?;

  let connection = remote.connect(Direction::Fetch).map_err(|e| FetchError::Connect {
    url: url.to_string(),
    source: Box::new(e),
  })?;

  connection
    .prepare_fetch(gix::progress::Discard, Default::default())
    .map_err(|e| FetchError::Fetch {
      url: url.to_string(),
      source: Box::new(e),
    })?
    .receive(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| FetchError::Fetch {
      url: url.to_string(),
      source: Box::new(e),
    })?;

  Ok(())
}

/// Resolve a revision spec to a commit hash.
///
/// Branch names resolve against the remote-tracking refs first so a fetch
/// moves them forward; tags and commit hashes resolve directly.
fn resolve_revision(repo: &gix::Repository, rev: Option<&str>) -> Result<String, FetchError> {
  match rev {
    Some(rev_str) => {
      let candidates = [
        format!("refs/remotes/origin/{}", rev_str),
        rev_str.to_string(),
        format!("refs/tags/{}", rev_str),
      ];

      candidates
        .iter()
        .find_map(|spec| peel_spec(repo, spec))
        .ok_or_else(|| FetchError::RevisionNotFound {
          rev: rev_str.to_string(),
        })
    }
    None => {
      let head_name = repo.head_name().map_err(|e| FetchError::ResolveHead(e.to_string()))?;
      if let Some(head_name) = head_name
        && let Some(commit) = peel_spec(repo, &format!("refs/remotes/origin/{}", head_name.shorten()))
      {
        return Ok(commit);
      }

      let mut head = repo.head().map_err(|e| FetchError::ResolveHead(e.to_string()))?;
      let commit = head
        .peel_to_commit()
        .map_err(|e| FetchError::ResolveHead(e.to_string()))?;

      Ok(commit.id.to_string())
    }
  }
}

/// Resolve a single spec and peel it to a commit.
fn peel_spec(repo: &gix::Repository, spec: &str) -> Option<String> {
  let id = repo.rev_parse_single(spec).ok()?;
  let commit = id.object().ok()?.peel_to_commit().ok()?;
  trace!(spec, commit = %commit.id, "resolved spec");
  Some(commit.id.to_string())
}

/// Write the tree of `commit` into `dest`.
fn materialise_commit(repo: &gix::Repository, commit: &str, dest: &Path) -> Result<(), FetchError> {
  let wrap = |e: BoxError| FetchError::Materialise {
    rev: commit.to_string(),
    source: e,
  };

  let id = gix::ObjectId::from_hex(commit.as_bytes()).map_err(|e| wrap(Box::new(e)))?;
  let commit_obj = repo.find_commit(id).map_err(|e| wrap(Box::new(e)))?;
  let tree = commit_obj.tree().map_err(|e| wrap(Box::new(e)))?;

  write_tree(&tree, dest).map_err(wrap)
}

fn write_tree(tree: &gix::Tree<'_>, dir: &Path) -> Result<(), BoxError> {
  for entry in tree.iter() {
    let entry = entry?;
    let path = dir.join(entry.filename().to_string());

    match entry.mode().kind() {
      EntryKind::Tree => {
        fs::create_dir_all(&path)?;
        let subtree = entry.object()?.into_tree();
        write_tree(&subtree, &path)?;
      }
      EntryKind::Blob | EntryKind::BlobExecutable => {
        let object = entry.object()?;
        fs::write(&path, &object.data)?;
        if entry.mode().kind() == EntryKind::BlobExecutable {
          mark_executable(&path)?;
        }
      }
      EntryKind::Link => {
        let object = entry.object()?;
        let target = String::from_utf8_lossy(&object.data).into_owned();
        #[cfg(unix)]
        std::os::unix::fs::symlink(&target, &path)?;
        #[cfg(not(unix))]
        fs::write(&path, target)?;
      }
      EntryKind::Commit => {
        trace!(path = %path.display(), "skipping submodule");
      }
    }
  }
  Ok(())
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> std::io::Result<()> {
  use std::os::unix::fs::PermissionsExt;
  fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> std::io::Result<()> {
  Ok(())
}

/// Check whether `rev` is a full hex commit hash.
pub fn is_commit_hash(rev: &str) -> bool {
  rev.len() == 40 && rev.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Fetch a gzip-compressed tar archive into the store.
///
/// The revision of an archive is the SHA-256 of its bytes. When `expected` is
/// given the download must match it.
pub fn fetch_archive(
  name: &str,
  url: &str,
  expected: Option<&str>,
  cache: &InputCache,
) -> Result<(PathBuf, String), FetchError> {
  if let Some(expected) = expected
    && let Some(path) = cache.store.get(name, url, expected)
  {
    debug!(name, rev = expected, path = %path.display(), "using stored archive");
    return Ok((path, expected.to_string()));
  }

  let bytes = download(url, expected, &cache.downloads_dir)?;
  let actual = hash_bytes(&bytes).0;

  if let Some(expected) = expected
    && expected != actual
  {
    return Err(FetchError::HashMismatch {
      url: url.to_string(),
      expected: expected.to_string(),
      actual,
    });
  }

  let dest = cache.store.compute_store_path(name, url, &actual);
  if dest.is_dir() {
    return Ok((dest, actual));
  }

  let staging = cache.store.stage()?;
  unpack_tar_gz(&bytes, staging.path()).map_err(|e| FetchError::Unpack {
    url: url.to_string(),
    source: e,
  })?;
  let path = cache.store.install(staging, &dest)?;

  info!(name, rev = %actual, path = %path.display(), "unpacked archive input");
  Ok((path, actual))
}

/// Download `url`, reusing a previously downloaded copy of a pinned archive.
fn download(url: &str, expected: Option<&str>, downloads_dir: &Path) -> Result<Vec<u8>, FetchError> {
  if let Some(expected) = expected {
    let cached = downloads_dir.join(format!("{}.tar.gz", expected));
    if let Ok(bytes) = fs::read(&cached)
      && hash_bytes(&bytes).0 == expected
    {
      debug!(path = %cached.display(), "using cached download");
      return Ok(bytes);
    }
  }

  info!(url, "downloading archive");
  let wrap = |e: reqwest::Error| FetchError::Download {
    url: url.to_string(),
    source: e,
  };
  let bytes = reqwest::blocking::get(url)
    .and_then(|r| r.error_for_status())
    .and_then(|r| r.bytes())
    .map_err(wrap)?
    .to_vec();

  fs::create_dir_all(downloads_dir).map_err(|e| FetchError::CreateCacheDir(downloads_dir.to_path_buf(), e))?;
  let cached = downloads_dir.join(format!("{}.tar.gz", hash_bytes(&bytes).0));
  if let Err(e) = fs::write(&cached, &bytes) {
    debug!(path = %cached.display(), error = %e, "could not cache download");
  }

  Ok(bytes)
}

/// Unpack a `.tar.gz` archive, stripping the top-level directory.
pub fn unpack_tar_gz(data: &[u8], dest: &Path) -> std::io::Result<()> {
  let mut archive = Archive::new(GzDecoder::new(data));

  for entry in archive.entries()? {
    let mut entry = entry?;
    let path = entry.path()?.into_owned();

    // Strip the first component (e.g., rust-overlay-master/)
    let stripped: PathBuf = path.components().skip(1).collect();

    if stripped.as_os_str().is_empty() {
      continue;
    }
    if stripped
      .components()
      .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
      trace!(path = %path.display(), "skipping entry outside the archive root");
      continue;
    }

    let dest_path = dest.join(&stripped);
    if let Some(parent) = dest_path.parent() {
      fs::create_dir_all(parent)?;
    }

    entry.unpack(&dest_path)?;
  }

  Ok(())
}

/// Resolve a path input.
///
/// Handles:
/// - Tilde expansion (`~` -> home directory)
/// - Relative paths (resolved against `base_dir`)
/// - Validates the path exists
pub fn resolve_path(path_str: &str, base_dir: &Path) -> Result<PathBuf, FetchError> {
  let expanded = if let Some(rest) = path_str.strip_prefix("~/") {
    home_dir().join(rest)
  } else if path_str == "~" {
    home_dir()
  } else if Path::new(path_str).is_absolute() {
    PathBuf::from(path_str)
  } else {
    base_dir.join(path_str)
  };

  let canonical = dunce::canonicalize(&expanded).map_err(|e| {
    if e.kind() == std::io::ErrorKind::NotFound {
      FetchError::PathNotFound(expanded.clone())
    } else {
      FetchError::CanonicalizePath {
        path: expanded,
        source: e,
      }
    }
  })?;

  debug!(path = %canonical.display(), "resolved path input");
  Ok(canonical)
}
