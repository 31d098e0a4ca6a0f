//! Package sets.
//!
//! A package set maps attribute paths such as `rust-bin.nightly.latest.default`
//! to [`Package`]s. Every non-leaf segment of a path is a namespace. Packages
//! reference existing tool directories; nothing here builds them.
//!
//! - [`overlay`] - Ordered transforms that extend a package set

pub mod overlay;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A tool available to shells and targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
  /// Directory holding the package's executables.
  pub bin: PathBuf,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl Package {
  pub fn new(bin: impl Into<PathBuf>) -> Self {
    Self {
      version: None,
      bin: bin.into(),
      description: None,
    }
  }

  pub fn with_version(mut self, version: &str) -> Self {
    self.version = Some(version.to_string());
    self
  }

  pub fn with_description(mut self, description: &str) -> Self {
    self.description = Some(description.to_string());
    self
  }
}

/// An attribute of a package set: a package or a namespace of attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attr {
  Package(Package),
  Namespace(BTreeMap<String, Attr>),
}

impl Attr {
  pub fn kind(&self) -> AttrKind {
    match self {
      Attr::Package(_) => AttrKind::Package,
      Attr::Namespace(_) => AttrKind::Namespace,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
  Package,
  Namespace,
}

impl std::fmt::Display for AttrKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      AttrKind::Package => write!(f, "package"),
      AttrKind::Namespace => write!(f, "namespace"),
    }
  }
}

/// A set of packages keyed by attribute path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageSet {
  attrs: BTreeMap<String, Attr>,
}

impl PackageSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build a set from top-level attributes.
  pub fn from_attrs(attrs: BTreeMap<String, Attr>) -> Self {
    Self { attrs }
  }

  /// Insert a package at a dotted path, creating namespaces on the way.
  ///
  /// A package standing where a namespace is needed is replaced.
  pub fn insert(&mut self, path: &str, package: Package) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
      return;
    };

    let mut level = &mut self.attrs;
    for segment in segments {
      let entry = level
        .entry(segment.to_string())
        .or_insert_with(|| Attr::Namespace(BTreeMap::new()));
      if let Attr::Package(_) = entry {
        *entry = Attr::Namespace(BTreeMap::new());
      }
      let Attr::Namespace(children) = entry else {
        unreachable!("replaced with a namespace above");
      };
      level = children;
    }

    level.insert(leaf.to_string(), Attr::Package(package));
  }

  /// Look up the attribute at a dotted path.
  pub fn get(&self, path: &str) -> Option<&Attr> {
    let mut segments = path.split('.');
    let mut current = self.attrs.get(segments.next()?)?;
    for segment in segments {
      match current {
        Attr::Namespace(children) => current = children.get(segment)?,
        Attr::Package(_) => return None,
      }
    }
    Some(current)
  }

  /// Look up a package (not a namespace) at a dotted path.
  pub fn package(&self, path: &str) -> Option<&Package> {
    match self.get(path)? {
      Attr::Package(package) => Some(package),
      Attr::Namespace(_) => None,
    }
  }

  pub fn contains(&self, path: &str) -> bool {
    self.get(path).is_some()
  }

  /// Top-level attributes.
  pub fn attrs(&self) -> &BTreeMap<String, Attr> {
    &self.attrs
  }

  pub fn top_level(&self, name: &str) -> Option<&Attr> {
    self.attrs.get(name)
  }

  /// Set or replace a top-level attribute.
  pub fn set_top_level(&mut self, name: String, attr: Attr) {
    self.attrs.insert(name, attr);
  }

  pub fn is_empty(&self) -> bool {
    self.attrs.is_empty()
  }

  /// Every package with its dotted path, in path order.
  pub fn packages(&self) -> Vec<(String, &Package)> {
    let mut out = Vec::new();
    collect_packages(&self.attrs, "", &mut out);
    out
  }

  /// Number of packages (namespaces are not counted).
  pub fn len(&self) -> usize {
    self.packages().len()
  }
}

fn collect_packages<'a>(attrs: &'a BTreeMap<String, Attr>, prefix: &str, out: &mut Vec<(String, &'a Package)>) {
  for (name, attr) in attrs {
    let path = if prefix.is_empty() {
      name.clone()
    } else {
      format!("{}.{}", prefix, name)
    };
    match attr {
      Attr::Package(package) => out.push((path, package)),
      Attr::Namespace(children) => collect_packages(children, &path, out),
    }
  }
}

impl FromIterator<(String, Package)> for PackageSet {
  fn from_iter<I: IntoIterator<Item = (String, Package)>>(iter: I) -> Self {
    let mut set = PackageSet::new();
    for (path, package) in iter {
      set.insert(&path, package);
    }
    set
  }
}
