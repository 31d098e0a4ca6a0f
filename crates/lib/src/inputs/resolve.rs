//! Input resolution orchestration.
//!
//! This module coordinates the full input resolution flow:
//! 1. Build the dependency graph from the root descriptor's `inputs` table
//! 2. Fetch each input (lock file revisions first), read its own descriptor,
//!    and queue the inputs it declares, applying the parent's overrides
//! 3. Resolve `follows` declarations and order the graph
//! 4. Build the resolved tree and the new lock file
//!
//! # Lock Rules
//!
//! - If locked and the URL matches: use the locked revision
//! - If a root input is locked with a different URL: error (requires `envpin update`)
//! - If a transitive input's URL changed upstream: fetch it again
//! - If not locked: fetch the latest revision and add it to the lock file
//! - Lock nodes that are no longer part of the graph are dropped

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::fetch::{FetchError, fetch_archive, fetch_git, resolve_path};
use super::graph::{DependencyGraph, GraphError, build_initial_graph, join_path};
use super::lock::{LOCK_FILENAME, LockError, LockFile, ROOT_NODE};
use super::source::{InputSource, ParseError, parse, source_type};
use super::store::InputCache;
use super::types::{InputDecls, InputOverride, LockNode, LockRef, ResolvedInput, ResolvedInputs};
use crate::lua::descriptor::read_input_decls;
use crate::util::hash::hash_directory;

/// How the lock file takes part in resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockMode {
  /// Read `envpin.lock` next to the descriptor and report changes to it.
  ///
  /// `force_update`:
  /// - `None`: use lock file revisions when available
  /// - `Some(empty set)`: ignore the lock for every input
  /// - `Some(names)`: ignore the lock for the named root inputs and everything below them
  Locked { force_update: Option<HashSet<String>> },
  /// Never read or write a lock file.
  Unlocked,
}

/// Options for [`resolve_inputs`].
#[derive(Debug, Clone)]
pub struct ResolveOptions {
  pub lock: LockMode,
  pub cache: InputCache,
}

impl Default for ResolveOptions {
  fn default() -> Self {
    Self {
      lock: LockMode::Locked { force_update: None },
      cache: InputCache::default(),
    }
  }
}

impl ResolveOptions {
  pub fn unlocked() -> Self {
    Self {
      lock: LockMode::Unlocked,
      ..Self::default()
    }
  }

  pub fn with_cache(mut self, cache: InputCache) -> Self {
    self.cache = cache;
    self
  }

  pub fn with_lock(mut self, lock: LockMode) -> Self {
    self.lock = lock;
    self
  }
}

/// Result of input resolution.
#[derive(Debug)]
pub struct ResolutionResult {
  /// Resolved root inputs with their transitive inputs.
  pub inputs: ResolvedInputs,
  /// Every fetched node, keyed by graph path.
  pub nodes: BTreeMap<String, ResolvedInput>,
  /// Node paths ordered so dependencies come first.
  pub order: Vec<String>,
  /// The lock file describing this resolution.
  pub lock_file: LockFile,
  /// Whether the lock file changed and should be written.
  pub lock_changed: bool,
}

/// Errors that can occur during input resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("failed to parse input '{name}': {source}")]
  Parse {
    name: String,
    #[source]
    source: ParseError,
  },

  /// An input declaration without a URL.
  #[error("input '{name}' has no url")]
  MissingUrl { name: String },

  /// Lock file URL doesn't match the descriptor URL.
  #[error("input '{name}' URL changed from '{locked_url}' to '{config_url}'. Run 'envpin update {name}' to update.")]
  LockMismatch {
    name: String,
    locked_url: String,
    config_url: String,
  },

  #[error("failed to fetch input '{name}': {source}")]
  Fetch {
    name: String,
    #[source]
    source: FetchError,
  },

  /// Failed to read the inputs an input declares.
  #[error("failed to read descriptor of input '{name}': {source}")]
  Descriptor {
    name: String,
    #[source]
    source: mlua::Error,
  },

  /// A `follows` names an input that is not declared anywhere in the graph.
  #[error("unresolved reference: '{from}' follows '{target}', which is not declared")]
  UnresolvedReference { from: String, target: String },

  #[error("circular follows detected: {chain}")]
  CircularFollows { chain: String },

  /// Inputs depend on each other in a loop.
  #[error("circular input dependency: {chain}")]
  CircularInput { chain: String },

  #[error(transparent)]
  Graph(GraphError),

  #[error("failed to load lock file: {0}")]
  LoadLock(#[source] LockError),

  #[error("failed to save lock file: {0}")]
  SaveLock(#[source] LockError),
}

impl From<GraphError> for ResolveError {
  fn from(err: GraphError) -> Self {
    match err {
      GraphError::FollowsTargetNotFound { from, target } => ResolveError::UnresolvedReference { from, target },
      GraphError::CircularFollows { chain } => ResolveError::CircularFollows { chain },
      GraphError::Cycle { node } => ResolveError::CircularInput { chain: node },
      other => ResolveError::Graph(other),
    }
  }
}

/// A node after fetching, before the tree is assembled.
#[derive(Debug, Clone)]
struct FetchedNode {
  url: String,
  type_: &'static str,
  path: PathBuf,
  rev: String,
  content_hash: Option<String>,
  /// What makes two nodes the same source, used to detect input loops.
  identity: String,
}

/// Resolve all inputs declared by a descriptor.
///
/// # Arguments
///
/// * `root_inputs` - The descriptor's input declarations
/// * `descriptor_dir` - Directory containing the descriptor (lock file and relative paths)
/// * `options` - Lock mode and cache locations
///
/// # Errors
///
/// Returns [`ResolveError`] if:
/// - An input URL cannot be parsed
/// - A locked root input's URL doesn't match the descriptor
/// - An input cannot be fetched
/// - A `follows` is dangling or circular
/// - Inputs depend on each other in a loop
pub fn resolve_inputs(
  root_inputs: &InputDecls,
  descriptor_dir: &Path,
  options: &ResolveOptions,
) -> Result<ResolutionResult, ResolveError> {
  let lock_path = descriptor_dir.join(LOCK_FILENAME);

  let (old_lock, force_update) = match &options.lock {
    LockMode::Locked { force_update } => (
      LockFile::load(&lock_path).map_err(ResolveError::LoadLock)?,
      force_update.as_ref(),
    ),
    LockMode::Unlocked => (None, None),
  };

  info!(count = root_inputs.len(), "resolving inputs");

  let mut graph = build_initial_graph(root_inputs);
  let mut fetched: BTreeMap<String, FetchedNode> = BTreeMap::new();
  let mut queue: VecDeque<String> = root_inputs.keys().cloned().collect();

  while let Some(node_path) = queue.pop_front() {
    let Some(node) = graph.get(&node_path).cloned() else {
      continue;
    };

    let url = node
      .decl
      .url()
      .ok_or_else(|| ResolveError::MissingUrl {
        name: node_path.clone(),
      })?
      .to_string();

    debug!(name = %node_path, url = %url, "resolving input");

    let should_force = force_update
      .map(|set| {
        set.is_empty()
          || set
            .iter()
            .any(|n| node_path == *n || node_path.starts_with(&format!("{}/", n)))
      })
      .unwrap_or(false);

    let locked = match old_lock.as_ref().and_then(|l| l.get(&node_path)) {
      Some(_) if should_force => None,
      Some(locked) if locked.url.as_deref() != Some(url.as_str()) => {
        if node.is_root_level() {
          return Err(ResolveError::LockMismatch {
            name: node_path.clone(),
            locked_url: locked.url.clone().unwrap_or_default(),
            config_url: url,
          });
        }
        debug!(name = %node_path, "transitive input URL changed, fetching again");
        None
      }
      other => other,
    };

    let base_dir = if node.is_root_level() {
      descriptor_dir.to_path_buf()
    } else {
      fetched
        .get(&node.parent_path)
        .map(|p| p.path.clone())
        .unwrap_or_else(|| descriptor_dir.to_path_buf())
    };

    let entry = fetch_node(&node_path, &url, &base_dir, locked, &options.cache)?;
    check_ancestry(&graph, &fetched, &node_path, &entry)?;

    let declared = read_input_decls(&entry.path).map_err(|e| ResolveError::Descriptor {
      name: node_path.clone(),
      source: e,
    })?;

    let overrides = node.decl.overrides().cloned().unwrap_or_default();
    for dep_name in overrides.keys() {
      if !declared.contains_key(dep_name) {
        warn!(input = %node_path, dep = %dep_name, "override names an input that is not declared");
      }
    }

    for (dep_name, dep_decl) in &declared {
      let child_decl = match overrides.get(dep_name) {
        Some(InputOverride::Follows(_)) => continue,
        Some(InputOverride::Url(url)) => dep_decl.with_url(url),
        None => dep_decl.clone(),
      };
      let child_path = graph.add_transitive(dep_name, child_decl, &node_path);
      queue.push_back(child_path);
    }

    if let Some(node) = graph.get_mut(&node_path) {
      node.declared_inputs = Some(declared);
    }
    fetched.insert(node_path, entry);
  }

  graph.resolve_follows()?;
  let order = graph.evaluation_order()?;

  let mut nodes: BTreeMap<String, ResolvedInput> = BTreeMap::new();
  for path in &order {
    let (Some(node), Some(entry)) = (graph.get(path), fetched.get(path)) else {
      continue;
    };

    let mut inputs = ResolvedInputs::new();
    for dep_name in node.declared_inputs.iter().flat_map(|d| d.keys()) {
      let target = graph.resolved_dependency(path, dep_name);
      if let Some(resolved) = nodes.get(&target) {
        inputs.insert(dep_name.clone(), resolved.clone());
      }
    }

    nodes.insert(
      path.clone(),
      ResolvedInput {
        node: path.clone(),
        url: entry.url.clone(),
        type_: entry.type_.to_string(),
        path: entry.path.clone(),
        rev: entry.rev.clone(),
        content_hash: entry.content_hash.clone(),
        inputs,
      },
    );
  }

  let inputs: ResolvedInputs = root_inputs
    .keys()
    .filter_map(|name| nodes.get(name).map(|r| (name.clone(), r.clone())))
    .collect();

  let lock_file = build_lock_file(&graph, &fetched, root_inputs, old_lock.as_ref());

  if let Some(old) = &old_lock {
    for stale in old.input_paths() {
      if !fetched.contains_key(stale) {
        warn!(name = %stale, "removing stale input from lock file");
      }
    }
  }

  let lock_changed = match options.lock {
    LockMode::Locked { .. } => old_lock.as_ref() != Some(&lock_file),
    LockMode::Unlocked => false,
  };

  Ok(ResolutionResult {
    inputs,
    nodes,
    order,
    lock_file,
    lock_changed,
  })
}

/// Fetch a single node according to its source type.
fn fetch_node(
  name: &str,
  url: &str,
  base_dir: &Path,
  locked: Option<&LockNode>,
  cache: &InputCache,
) -> Result<FetchedNode, ResolveError> {
  let source = parse(url).map_err(|e| ResolveError::Parse {
    name: name.to_string(),
    source: e,
  })?;
  let type_ = source_type(&source);
  let locked_rev = locked.and_then(|l| l.rev.as_deref());

  let fetch_err = |e: FetchError| ResolveError::Fetch {
    name: name.to_string(),
    source: e,
  };

  let (path, rev, content_hash, identity) = match source {
    InputSource::Git { url: git_url, rev } => {
      let target_rev = locked_rev.or(rev.as_deref());
      let (path, rev) = fetch_git(name, &git_url, target_rev, cache).map_err(fetch_err)?;
      (path, rev, None, format!("git:{}", git_url))
    }
    InputSource::Path { path: path_str } => {
      let resolved = resolve_path(&path_str.to_string_lossy(), base_dir).map_err(fetch_err)?;
      let hash = hash_directory(&resolved, &[".git", LOCK_FILENAME]).map_err(|e| {
        fetch_err(FetchError::Hash {
          path: resolved.clone(),
          source: e,
        })
      })?;
      let identity = format!("path:{}", resolved.display());
      (resolved, "local".to_string(), Some(hash.0), identity)
    }
    InputSource::Archive { url: archive_url } => {
      let (path, rev) = fetch_archive(name, &archive_url, locked_rev, cache).map_err(fetch_err)?;
      (path, rev, None, format!("tarball:{}", archive_url))
    }
  };

  Ok(FetchedNode {
    url: url.to_string(),
    type_,
    path,
    rev,
    content_hash,
    identity,
  })
}

/// Reject a node that refers back to one of its own ancestors.
fn check_ancestry(
  graph: &DependencyGraph,
  fetched: &BTreeMap<String, FetchedNode>,
  node_path: &str,
  entry: &FetchedNode,
) -> Result<(), ResolveError> {
  let mut chain = vec![node_path.to_string()];
  let mut current = graph.get(node_path).map(|n| n.parent_path.clone()).unwrap_or_default();

  while !current.is_empty() {
    chain.push(current.clone());
    if fetched.get(&current).is_some_and(|a| a.identity == entry.identity) {
      chain.reverse();
      return Err(ResolveError::CircularInput {
        chain: chain.join(" -> "),
      });
    }
    current = graph.get(&current).map(|n| n.parent_path.clone()).unwrap_or_default();
  }

  Ok(())
}

fn build_lock_file(
  graph: &DependencyGraph,
  fetched: &BTreeMap<String, FetchedNode>,
  root_inputs: &InputDecls,
  old_lock: Option<&LockFile>,
) -> LockFile {
  let now = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or(0);

  let mut lock_file = LockFile::new();

  let root_refs = root_inputs
    .keys()
    .filter(|name| fetched.contains_key(*name))
    .map(|name| (name.clone(), LockRef::Node(name.clone())))
    .collect();
  lock_file.insert(ROOT_NODE.to_string(), LockNode::root(root_refs));

  for (path, entry) in fetched {
    let Some(node) = graph.get(path) else {
      continue;
    };

    let mut refs = BTreeMap::new();
    for dep_name in node.declared_inputs.iter().flat_map(|d| d.keys()) {
      let reference = match node.decl.overrides().and_then(|o| o.get(dep_name)) {
        Some(InputOverride::Follows(target)) => LockRef::Follows(target.split('/').map(str::to_string).collect()),
        _ => LockRef::Node(join_path(path, dep_name)),
      };
      refs.insert(dep_name.clone(), reference);
    }

    let last_modified = old_lock
      .and_then(|l| l.get(path))
      .filter(|old| {
        old.url.as_deref() == Some(entry.url.as_str())
          && old.rev.as_deref() == Some(entry.rev.as_str())
          && old.content_hash == entry.content_hash
      })
      .and_then(|old| old.last_modified)
      .unwrap_or(now);

    if old_lock.and_then(|l| l.get(path)).is_none() {
      info!(name = %path, rev = %entry.rev, "locking input");
    }

    lock_file.insert(
      path.clone(),
      LockNode::input(entry.type_, &entry.url, &entry.rev, Some(last_modified))
        .with_content_hash(entry.content_hash.clone())
        .with_inputs(refs),
    );
  }

  lock_file
}

/// Save the lock file if it changed.
pub fn save_lock_file_if_changed(result: &ResolutionResult, descriptor_dir: &Path) -> Result<(), ResolveError> {
  if result.lock_changed {
    let lock_path = descriptor_dir.join(LOCK_FILENAME);
    info!(path = %lock_path.display(), "writing lock file");
    result.lock_file.save(&lock_path).map_err(ResolveError::SaveLock)?;
  }
  Ok(())
}
