//! Input types for declaration and resolution.
//!
//! - [`InputDecl`] - Parsed input declaration from Lua (before resolution)
//! - [`InputOverride`] - Override specification for transitive dependencies
//! - [`ResolvedInput`] - A fully resolved input with path, revision, and transitive deps
//! - [`LockNode`] - A node of the lock file graph

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Maximum depth for follows chain resolution.
/// Prevents infinite loops in malformed descriptors.
pub const MAX_FOLLOWS_DEPTH: usize = 10;

/// A parsed input declaration (before resolution).
///
/// Inputs can be declared in two forms:
/// 1. Simple string URL: `"git:https://github.com/org/repo.git"`
/// 2. Extended table with URL and overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputDecl {
  /// Simple URL string.
  ///
  /// ```lua
  /// inputs = {
  ///   nixpkgs = "git:https://github.com/org/pkgs.git#master",
  /// }
  /// ```
  Url(String),

  /// Extended declaration with optional URL and input overrides.
  ///
  /// ```lua
  /// inputs = {
  ///   ["rust-overlay"] = {
  ///     url = "git:https://github.com/org/rust-overlay.git",
  ///     inputs = {
  ///       nixpkgs = { follows = "nixpkgs" },
  ///     },
  ///   },
  /// }
  /// ```
  Extended {
    /// The URL of the input. `None` is only valid for a transitive input whose
    /// URL is inherited from the input's own descriptor.
    url: Option<String>,
    /// Overrides for transitive dependencies.
    inputs: BTreeMap<String, InputOverride>,
  },
}

impl InputDecl {
  /// Get the URL from the declaration, if present.
  pub fn url(&self) -> Option<&str> {
    match self {
      InputDecl::Url(url) => Some(url),
      InputDecl::Extended { url, .. } => url.as_deref(),
    }
  }

  /// Get the input overrides, if any.
  pub fn overrides(&self) -> Option<&BTreeMap<String, InputOverride>> {
    match self {
      InputDecl::Url(_) => None,
      InputDecl::Extended { inputs, .. } => {
        if inputs.is_empty() {
          None
        } else {
          Some(inputs)
        }
      }
    }
  }

  /// Check if this declaration has any overrides.
  pub fn has_overrides(&self) -> bool {
    matches!(self, InputDecl::Extended { inputs, .. } if !inputs.is_empty())
  }

  /// Replace the URL, keeping any overrides.
  pub fn with_url(&self, url: &str) -> Self {
    match self {
      InputDecl::Url(_) => InputDecl::Url(url.to_string()),
      InputDecl::Extended { inputs, .. } => InputDecl::Extended {
        url: Some(url.to_string()),
        inputs: inputs.clone(),
      },
    }
  }
}

/// An override specification for a transitive dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputOverride {
  /// Override with a different URL.
  Url(String),

  /// Follow another input (use its resolved value).
  ///
  /// The follows path can be:
  /// - A direct input name: `"nixpkgs"`
  /// - A path to a transitive dep: `"rust-overlay/flake-utils"`
  Follows(String),
}

impl InputOverride {
  pub fn is_follows(&self) -> bool {
    matches!(self, InputOverride::Follows(_))
  }

  /// Get the follows path, if this is a follows override.
  pub fn follows_path(&self) -> Option<&str> {
    match self {
      InputOverride::Follows(path) => Some(path),
      InputOverride::Url(_) => None,
    }
  }
}

/// A resolved input ready for use.
///
/// Inputs reached through `follows` are clones of their target, so two names
/// that share a resolution compare equal, down to the `node` path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedInput {
  /// Graph path of the node that was actually fetched (e.g. `nixpkgs` or
  /// `rust-overlay/flake-utils`).
  pub node: String,

  /// Original URL as declared.
  pub url: String,

  /// Source type: "git", "path" or "tarball".
  #[serde(rename = "type")]
  pub type_: String,

  /// Absolute path to the input's root directory.
  pub path: PathBuf,

  /// The resolved revision (git commit hash, archive sha256, or "local").
  pub rev: String,

  /// Content hash of path inputs, used to notice local edits.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content_hash: Option<String>,

  /// Resolved transitive dependencies of this input, keyed by the name the
  /// input's own descriptor declares.
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub inputs: ResolvedInputs,
}

/// Map of input names to their resolved state.
pub type ResolvedInputs = BTreeMap<String, ResolvedInput>;

/// Map of input names to their declarations.
pub type InputDecls = BTreeMap<String, InputDecl>;

/// Reference from a lock node to one of its inputs.
///
/// A plain string names another node; an array is a follows path resolved
/// from the root (e.g. `["nixpkgs"]` or `["rust-overlay", "flake-utils"]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LockRef {
  Node(String),
  Follows(Vec<String>),
}

/// A node in the dependency graph for lock file serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockNode {
  /// Input type: "git", "path" or "tarball". Absent on the root node.
  #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
  pub type_: Option<String>,

  /// Original URL from the descriptor.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub url: Option<String>,

  /// Pinned revision.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub rev: Option<String>,

  /// Content hash of path inputs.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub content_hash: Option<String>,

  /// Unix timestamp of when this input was last fetched.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub last_modified: Option<u64>,

  /// References to dependency nodes.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub inputs: BTreeMap<String, LockRef>,
}

impl LockNode {
  /// Create a new root node.
  pub fn root(inputs: BTreeMap<String, LockRef>) -> Self {
    Self {
      type_: None,
      url: None,
      rev: None,
      content_hash: None,
      last_modified: None,
      inputs,
    }
  }

  /// Create a new input node.
  pub fn input(type_: &str, url: &str, rev: &str, last_modified: Option<u64>) -> Self {
    Self {
      type_: Some(type_.to_string()),
      url: Some(url.to_string()),
      rev: Some(rev.to_string()),
      content_hash: None,
      last_modified,
      inputs: BTreeMap::new(),
    }
  }

  pub fn with_content_hash(mut self, hash: Option<String>) -> Self {
    self.content_hash = hash;
    self
  }

  pub fn with_inputs(mut self, inputs: BTreeMap<String, LockRef>) -> Self {
    self.inputs = inputs;
    self
  }

  pub fn is_root(&self) -> bool {
    self.type_.is_none() && self.url.is_none()
  }
}
