//! Named build targets.
//!
//! A target either produces nothing ([`Target::Empty`], the placeholder) or
//! links the executables of a list of tools into a content-addressed output
//! directory ([`Target::Bundle`]).

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::shell::ShellTool;
use crate::util::hash::{HashError, Hashable};

/// Name used when `build` is invoked without a target.
pub const DEFAULT_TARGET: &str = "default";

#[derive(Debug, thiserror::Error)]
pub enum TargetError {
  #[error("target '{name}' not found (available: {})", available.join(", "))]
  NotFound { name: String, available: Vec<String> },

  #[error("failed to hash target '{name}'")]
  Hash {
    name: String,
    #[source]
    source: HashError,
  },

  #[error("failed to build target '{name}' at {}", path.display())]
  Io {
    name: String,
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Target {
  /// Produces an artifact with no files.
  Empty,
  Bundle(Bundle),
}

impl Target {
  pub fn kind(&self) -> &'static str {
    match self {
      Target::Empty => "empty",
      Target::Bundle(_) => "bundle",
    }
  }
}

/// Tools whose executables are linked into one `bin` directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Bundle {
  pub tools: Vec<ShellTool>,
}

impl Hashable for Bundle {}

pub type Targets = BTreeMap<String, Target>;

/// Result of building a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Artifact {
  pub name: String,
  pub out: Option<PathBuf>,
  pub files: Vec<PathBuf>,
  pub log: Vec<String>,
}

/// The target `build` picks when none is named: `default`, or the only one.
pub fn default_target_name(targets: &Targets) -> Option<&str> {
  if targets.contains_key(DEFAULT_TARGET) {
    return Some(DEFAULT_TARGET);
  }
  match targets.keys().collect::<Vec<_>>().as_slice() {
    [only] => Some(only.as_str()),
    _ => None,
  }
}

/// Build the target called `name`, placing outputs under `store_dir/targets`.
pub fn build_target(targets: &Targets, name: &str, store_dir: &Path) -> Result<Artifact, TargetError> {
  let target = targets.get(name).ok_or_else(|| TargetError::NotFound {
    name: name.to_string(),
    available: targets.keys().cloned().collect(),
  })?;

  match target {
    Target::Empty => {
      debug!(target = %name, "empty target, nothing to build");
      Ok(Artifact {
        name: name.to_string(),
        ..Default::default()
      })
    }
    Target::Bundle(bundle) => build_bundle(name, bundle, store_dir),
  }
}

fn build_bundle(name: &str, bundle: &Bundle, store_dir: &Path) -> Result<Artifact, TargetError> {
  let hash = bundle.compute_hash().map_err(|e| TargetError::Hash {
    name: name.to_string(),
    source: e,
  })?;
  let targets_dir = store_dir.join("targets");
  let out = targets_dir.join(format!("{}-{}", name, hash));
  let io_err = |path: &Path| {
    let path = path.to_path_buf();
    move |source: io::Error| TargetError::Io {
      name: name.to_string(),
      path,
      source,
    }
  };

  if out.is_dir() {
    info!(target = %name, out = %out.display(), "reusing existing output");
    let files = list_bin(&out).map_err(io_err(&out))?;
    return Ok(Artifact {
      name: name.to_string(),
      log: vec![format!("reused {}", out.display())],
      out: Some(out),
      files,
    });
  }

  fs::create_dir_all(&targets_dir).map_err(io_err(&targets_dir))?;
  let staging = tempfile::Builder::new()
    .prefix(".staging-")
    .tempdir_in(&targets_dir)
    .map_err(io_err(&targets_dir))?;
  let staging_bin = staging.path().join("bin");
  fs::create_dir_all(&staging_bin).map_err(io_err(&staging_bin))?;

  let mut linked = BTreeSet::new();
  let mut log = Vec::new();
  for tool in &bundle.tools {
    for exe in list_dir_sorted(&tool.bin).map_err(io_err(&tool.bin))? {
      let Some(file_name) = exe.file_name().map(|n| n.to_os_string()) else {
        continue;
      };
      if !linked.insert(file_name.clone()) {
        log.push(format!(
          "skipped {} from {} (already provided)",
          file_name.to_string_lossy(),
          tool.name
        ));
        continue;
      }
      let link = staging_bin.join(&file_name);
      symlink(&exe, &link).map_err(io_err(&link))?;
      log.push(format!("linked {} -> {}", file_name.to_string_lossy(), exe.display()));
    }
  }

  if out.is_dir() {
    debug!(out = %out.display(), "output appeared concurrently, discarding staged copy");
  } else {
    fs::rename(staging.path(), &out).map_err(io_err(&out))?;
  }

  let files = list_bin(&out).map_err(io_err(&out))?;
  info!(target = %name, out = %out.display(), files = files.len(), "built bundle");
  Ok(Artifact {
    name: name.to_string(),
    out: Some(out),
    files,
    log,
  })
}

fn list_bin(out: &Path) -> io::Result<Vec<PathBuf>> {
  list_dir_sorted(&out.join("bin"))
}

fn list_dir_sorted(dir: &Path) -> io::Result<Vec<PathBuf>> {
  let mut entries = fs::read_dir(dir)?
    .map(|entry| entry.map(|e| e.path()))
    .collect::<io::Result<Vec<_>>>()?;
  entries.sort();
  Ok(entries)
}

#[cfg(unix)]
fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(src, dst)
}

#[cfg(windows)]
fn symlink(src: &Path, dst: &Path) -> io::Result<()> {
  std::os::windows::fs::symlink_file(src, dst)
}
