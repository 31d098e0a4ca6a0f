//! Dependency graph building and resolution.
//!
//! This module handles:
//! - Building a dependency graph from input declarations
//! - Resolving `follows` declarations (with chain support)
//! - Rejecting `follows` that point at inputs nobody declares
//! - Ordering inputs so every input is evaluated after its dependencies
//!
//! Node paths are `/`-joined input names starting at the root descriptor:
//! `nixpkgs` is a root input, `rust-overlay/flake-utils` is the `flake-utils`
//! input declared by `rust-overlay`'s own descriptor.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use thiserror::Error;
use tracing::{debug, trace};

use super::types::{InputDecl, InputDecls, InputOverride, MAX_FOLLOWS_DEPTH};

/// A node in the dependency graph.
#[derive(Debug, Clone)]
pub struct GraphNode {
  /// The input name (as declared in the parent's inputs table).
  pub name: String,

  /// The input declaration, with any URL override from the parent applied.
  pub decl: InputDecl,

  /// Parent node path. Empty for root-level inputs.
  pub parent_path: String,

  /// The full path to this node (e.g., "nixpkgs" or "rust-overlay/flake-utils").
  pub full_path: String,

  /// Inputs declared by this input's own descriptor.
  /// Only populated after the input is fetched.
  pub declared_inputs: Option<InputDecls>,
}

impl GraphNode {
  pub fn root_input(name: String, decl: InputDecl) -> Self {
    Self {
      full_path: name.clone(),
      name,
      decl,
      parent_path: String::new(),
      declared_inputs: None,
    }
  }

  pub fn transitive(name: String, decl: InputDecl, parent_path: &str) -> Self {
    Self {
      full_path: join_path(parent_path, &name),
      name,
      decl,
      parent_path: parent_path.to_string(),
      declared_inputs: None,
    }
  }

  /// Check if this is a root-level input (declared directly in the descriptor).
  pub fn is_root_level(&self) -> bool {
    self.parent_path.is_empty()
  }

  /// Depth of the node below the root descriptor (root inputs are depth 1).
  pub fn depth(&self) -> usize {
    self.full_path.split('/').count()
  }
}

/// The dependency graph structure.
#[derive(Debug, Default)]
pub struct DependencyGraph {
  /// All fetched nodes, keyed by their full path.
  pub nodes: BTreeMap<String, GraphNode>,

  /// Edges: parent path -> child paths that were added as real nodes.
  pub edges: BTreeMap<String, BTreeSet<String>>,

  /// Follows mappings after resolution: source_path -> target_path.
  pub follows_resolved: BTreeMap<String, String>,
}

/// Errors that can occur during graph operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
  /// A follows target does not exist.
  #[error("follows target '{target}' not found (referenced from '{from}')")]
  FollowsTargetNotFound { from: String, target: String },

  #[error("circular follows detected: {chain}")]
  CircularFollows { chain: String },

  #[error("follows chain too deep (maximum {max} hops): {chain}")]
  FollowsChainTooDeep { max: usize, chain: String },

  #[error("invalid follows path '{path}': {reason}")]
  InvalidFollowsPath { path: String, reason: String },

  /// The inputs depend on each other in a loop.
  #[error("circular input dependency involving '{node}'")]
  Cycle { node: String },
}

impl DependencyGraph {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_root_input(&mut self, name: &str, decl: InputDecl) {
    let node = GraphNode::root_input(name.to_string(), decl);
    self.nodes.insert(node.full_path.clone(), node);
  }

  /// Add a transitive dependency to the graph, returning its full path.
  pub fn add_transitive(&mut self, name: &str, decl: InputDecl, parent_path: &str) -> String {
    let node = GraphNode::transitive(name.to_string(), decl, parent_path);
    let full_path = node.full_path.clone();

    self
      .edges
      .entry(parent_path.to_string())
      .or_default()
      .insert(full_path.clone());

    self.nodes.insert(full_path.clone(), node);
    full_path
  }

  pub fn get(&self, path: &str) -> Option<&GraphNode> {
    self.nodes.get(path)
  }

  pub fn get_mut(&mut self, path: &str) -> Option<&mut GraphNode> {
    self.nodes.get_mut(path)
  }

  /// Get all root-level input names.
  pub fn root_inputs(&self) -> Vec<&str> {
    self
      .nodes
      .values()
      .filter(|n| n.is_root_level())
      .map(|n| n.name.as_str())
      .collect()
  }

  /// Get the child nodes added under a node.
  pub fn dependencies(&self, path: &str) -> Vec<&str> {
    self
      .edges
      .get(path)
      .map(|deps| deps.iter().map(|s| s.as_str()).collect())
      .unwrap_or_default()
  }

  /// The node a dependency of `path` ends up using: the follows target when
  /// one was declared, otherwise the child node itself.
  pub fn resolved_dependency(&self, path: &str, dep: &str) -> String {
    let child = join_path(path, dep);
    self.follows_resolved.get(&child).cloned().unwrap_or(child)
  }

  /// Resolve all follows declarations in the graph.
  ///
  /// Chains are followed up to [`MAX_FOLLOWS_DEPTH`] hops and every final
  /// target must be a node of the graph.
  pub fn resolve_follows(&mut self) -> Result<(), GraphError> {
    let mut follows_to_resolve: Vec<(String, String)> = Vec::new();

    for node in self.nodes.values() {
      if let Some(overrides) = node.decl.overrides() {
        for (dep_name, override_) in overrides {
          if let InputOverride::Follows(target) = override_ {
            follows_to_resolve.push((join_path(&node.full_path, dep_name), target.clone()));
          }
        }
      }
    }

    for (source_path, target) in follows_to_resolve {
      let resolved = self.resolve_follows_chain(&source_path, &target)?;

      if !self.nodes.contains_key(&resolved) {
        return Err(GraphError::FollowsTargetNotFound {
          from: source_path,
          target,
        });
      }

      debug!(source = %source_path, target = %resolved, "resolved follows");
      self.follows_resolved.insert(source_path, resolved);
    }

    Ok(())
  }

  /// Resolve a follows chain to its final target.
  fn resolve_follows_chain(&self, source: &str, initial_target: &str) -> Result<String, GraphError> {
    let mut visited = HashSet::new();
    let mut chain = vec![source.to_string()];
    let mut current_target = initial_target.to_string();
    visited.insert(source.to_string());

    for depth in 0..MAX_FOLLOWS_DEPTH {
      let normalized = self.normalize_follows_path(&current_target)?;

      if visited.contains(&normalized) {
        chain.push(normalized);
        return Err(GraphError::CircularFollows {
          chain: chain.join(" -> "),
        });
      }

      visited.insert(normalized.clone());
      chain.push(normalized.clone());

      match self.get_follows_target(&normalized) {
        Some(next_target) => {
          trace!(depth, current = %normalized, next = %next_target, "following chain");
          current_target = next_target;
        }
        None => return Ok(normalized),
      }
    }

    Err(GraphError::FollowsChainTooDeep {
      max: MAX_FOLLOWS_DEPTH,
      chain: chain.join(" -> "),
    })
  }

  /// Normalize a follows path to a node path.
  ///
  /// Intermediate segments that are themselves follows are replaced by their
  /// target, so `rust-overlay/nixpkgs/utils` reads through
  /// `rust-overlay/nixpkgs -> nixpkgs` as `nixpkgs/utils`.
  fn normalize_follows_path(&self, path: &str) -> Result<String, GraphError> {
    if path.is_empty() {
      return Err(GraphError::InvalidFollowsPath {
        path: path.to_string(),
        reason: "path cannot be empty".to_string(),
      });
    }

    let segments: Vec<&str> = path.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
      return Err(GraphError::InvalidFollowsPath {
        path: path.to_string(),
        reason: "path segments cannot be empty".to_string(),
      });
    }

    let mut current = String::new();
    for (i, segment) in segments.iter().enumerate() {
      current = join_path(&current, segment);
      if i + 1 < segments.len()
        && let Some(target) = self.get_follows_target(&current)
      {
        current = target;
      }
    }

    Ok(current)
  }

  /// Get the follows target for a path, if it has one.
  fn get_follows_target(&self, path: &str) -> Option<String> {
    if let Some(resolved) = self.follows_resolved.get(path) {
      return Some(resolved.clone());
    }

    let (parent_path, dep_name) = path.rsplit_once('/')?;
    let node = self.nodes.get(parent_path)?;
    match node.decl.overrides()?.get(dep_name)? {
      InputOverride::Follows(target) => Some(target.clone()),
      InputOverride::Url(_) => None,
    }
  }

  /// Order nodes so every input comes after the inputs it depends on.
  ///
  /// Dependencies are the inputs a node's descriptor declares, with follows
  /// applied. A loop (e.g. an input following its own parent) is an error.
  pub fn evaluation_order(&self) -> Result<Vec<String>, GraphError> {
    let mut graph = DiGraph::<String, ()>::new();
    let mut indices = HashMap::new();

    for path in self.nodes.keys() {
      indices.insert(path.clone(), graph.add_node(path.clone()));
    }

    for (path, node) in &self.nodes {
      let Some(declared) = &node.declared_inputs else {
        continue;
      };
      for dep_name in declared.keys() {
        let target = self.resolved_dependency(path, dep_name);
        if let Some(&dep_idx) = indices.get(&target) {
          graph.add_edge(dep_idx, indices[path], ());
        }
      }
    }

    let order = toposort(&graph, None).map_err(|cycle| GraphError::Cycle {
      node: graph[cycle.node_id()].clone(),
    })?;

    Ok(order.into_iter().map(|idx| graph[idx].clone()).collect())
  }
}

/// Join a parent node path and an input name.
pub fn join_path(parent: &str, name: &str) -> String {
  if parent.is_empty() {
    name.to_string()
  } else {
    format!("{}/{}", parent, name)
  }
}

/// Build a dependency graph from root input declarations.
///
/// Transitive dependencies are added later as inputs are fetched and parsed.
pub fn build_initial_graph(root_inputs: &InputDecls) -> DependencyGraph {
  let mut graph = DependencyGraph::new();

  for (name, decl) in root_inputs {
    graph.add_root_input(name, decl.clone());
  }

  graph
}
