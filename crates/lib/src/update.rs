//! Input updates.
//!
//! `envpin update` re-resolves a descriptor's inputs, ignoring the pins of the
//! named inputs (or of every input), and rewrites `envpin.lock`.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::consts::{CLASSIC_FILENAME, DESCRIPTOR_FILENAME};
use crate::inputs::lock::{LOCK_FILENAME, LockError, LockFile, ROOT_NODE};
use crate::inputs::resolve::{LockMode, ResolveError, ResolveOptions, resolve_inputs, save_lock_file_if_changed};
use crate::inputs::store::InputCache;
use crate::inputs::{LockNode, ResolvedInputs};
use crate::lua::descriptor::{DescriptorKind, descriptor_kind, load_descriptor, parse_input_decls};
use crate::lua::runtime::{RuntimeContext, create_runtime};
use crate::platform::platform_triple;

#[derive(Debug, Default)]
pub struct UpdateOptions {
  /// Inputs to update, by name or graph path. Empty updates everything.
  pub inputs: Vec<String>,
  /// Resolve without writing the lock file.
  pub dry_run: bool,
  pub cache: InputCache,
}

/// What an update changed, keyed by lock node path.
#[derive(Debug)]
pub struct UpdateResult {
  /// Inputs whose revision changed: path -> (old, new).
  pub updated: BTreeMap<String, (String, String)>,
  pub unchanged: Vec<String>,
  /// Inputs that were not locked before.
  pub added: Vec<String>,
  /// Inputs dropped from the lock file.
  pub removed: Vec<String>,
  pub resolved: ResolvedInputs,
  pub lock_file: LockFile,
  pub lock_changed: bool,
  /// Whether the lock file was written.
  pub written: bool,
}

#[derive(Debug, Error)]
pub enum UpdateError {
  #[error("descriptor not found: {path}")]
  DescriptorNotFound { path: String },

  #[error("{} is a classic descriptor; only envpin.lua descriptors pin inputs", path.display())]
  NotPinned { path: PathBuf },

  #[error("failed to read inputs of {}", path.display())]
  ReadDescriptor {
    path: PathBuf,
    #[source]
    source: mlua::Error,
  },

  #[error("input '{name}' is not declared")]
  InputNotFound { name: String },

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error("failed to load lock file")]
  LoadLock(#[source] LockError),
}

/// Locate the descriptor to operate on.
///
/// Priority: `explicit`, then `envpin.lua`, then `shell.lua` in `cwd`.
pub fn find_descriptor_path(explicit: Option<&Path>, cwd: &Path) -> Result<PathBuf, UpdateError> {
  if let Some(path) = explicit {
    if path.is_file() {
      return Ok(path.to_path_buf());
    }
    return Err(UpdateError::DescriptorNotFound {
      path: path.display().to_string(),
    });
  }

  for name in [DESCRIPTOR_FILENAME, CLASSIC_FILENAME] {
    let candidate = cwd.join(name);
    if candidate.is_file() {
      return Ok(candidate);
    }
  }

  Err(UpdateError::DescriptorNotFound {
    path: format!(
      "{} or {} in {}",
      DESCRIPTOR_FILENAME,
      CLASSIC_FILENAME,
      cwd.display()
    ),
  })
}

/// Re-resolve the inputs of the descriptor at `descriptor_path`.
pub fn update_inputs(descriptor_path: &Path, options: &UpdateOptions) -> Result<UpdateResult, UpdateError> {
  let dir = descriptor_path.parent().unwrap_or(Path::new("."));
  let read_err = |source: mlua::Error| UpdateError::ReadDescriptor {
    path: descriptor_path.to_path_buf(),
    source,
  };

  let system = platform_triple().unwrap_or_default();
  let lua = create_runtime(&RuntimeContext::new(&system, dir)).map_err(read_err)?;
  let descriptor = load_descriptor(&lua, descriptor_path).map_err(read_err)?;
  if descriptor_kind(&descriptor).map_err(read_err)? == DescriptorKind::Classic {
    return Err(UpdateError::NotPinned {
      path: descriptor_path.to_path_buf(),
    });
  }
  let decls = parse_input_decls(descriptor.get("inputs").map_err(read_err)?).map_err(read_err)?;

  for name in &options.inputs {
    let root = name.split('/').next().unwrap_or(name);
    if !decls.contains_key(root) {
      return Err(UpdateError::InputNotFound { name: name.clone() });
    }
  }

  let old_lock = LockFile::load(&dir.join(LOCK_FILENAME))
    .map_err(UpdateError::LoadLock)?
    .unwrap_or_default();

  info!(
    descriptor = %descriptor_path.display(),
    inputs = ?options.inputs,
    dry_run = options.dry_run,
    "updating inputs"
  );

  let force: HashSet<String> = options.inputs.iter().cloned().collect();
  let resolve_options = ResolveOptions::default()
    .with_lock(LockMode::Locked {
      force_update: Some(force),
    })
    .with_cache(options.cache.clone());
  let result = resolve_inputs(&decls, dir, &resolve_options)?;

  let mut updated = BTreeMap::new();
  let mut unchanged = Vec::new();
  let mut added = Vec::new();
  for (path, node) in locked_inputs(&result.lock_file) {
    match old_lock.get(path) {
      Some(old) if same_pin(old, node) => unchanged.push(path.to_string()),
      Some(old) => {
        updated.insert(path.to_string(), (rev_label(old), rev_label(node)));
      }
      None => added.push(path.to_string()),
    }
  }
  let removed = old_lock
    .input_paths()
    .into_iter()
    .filter(|path| result.lock_file.get(path).is_none())
    .map(str::to_string)
    .collect();

  // A descriptor without inputs gets no lock file unless one already exists.
  let lock_path = dir.join(LOCK_FILENAME);
  let written = !options.dry_run && result.lock_changed && (!decls.is_empty() || lock_path.exists());
  if written {
    save_lock_file_if_changed(&result, dir)?;
  }

  Ok(UpdateResult {
    updated,
    unchanged,
    added,
    removed,
    resolved: result.inputs,
    lock_file: result.lock_file,
    lock_changed: result.lock_changed,
    written,
  })
}

fn locked_inputs(lock: &LockFile) -> impl Iterator<Item = (&str, &LockNode)> {
  lock
    .nodes
    .iter()
    .filter(|(path, _)| path.as_str() != ROOT_NODE)
    .map(|(path, node)| (path.as_str(), node))
}

fn same_pin(old: &LockNode, new: &LockNode) -> bool {
  old.url == new.url && old.rev == new.rev && old.content_hash == new.content_hash
}

/// Short revision for display: 12 characters of a commit or archive hash,
/// `local@<hash>` for path inputs.
pub fn rev_label(node: &LockNode) -> String {
  let rev = node.rev.as_deref().unwrap_or("-");
  match &node.content_hash {
    Some(hash) => format!("{}@{}", rev, &hash[..hash.len().min(12)]),
    None => rev[..rev.len().min(12)].to_string(),
  }
}
