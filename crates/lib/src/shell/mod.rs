//! Development shells.
//!
//! [`build_shell`] selects tools from a package set. The resulting
//! [`ShellEnvironment`] can spawn a process with the tools on `PATH` or render
//! an activation script for an interactive shell.
//!
//! - [`script`] - Per-shell statement syntax

pub mod script;

use std::collections::{BTreeMap, HashSet};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::consts::IN_SHELL_ENV;
use crate::pkgs::PackageSet;
use crate::util::hash::Hashable;

pub use script::Shell;

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
  #[error("tool '{name}' does not resolve to a package")]
  UnresolvedTool { name: String },

  #[error("tool directory cannot be placed on PATH")]
  InvalidPath(#[source] std::env::JoinPathsError),
}

/// A tool exposed by a shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShellTool {
  /// Attribute path the tool was requested by.
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
  pub bin: PathBuf,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl Hashable for ShellTool {}

/// Tools plus extra environment variables, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShellEnvironment {
  pub tools: Vec<ShellTool>,
  pub env: BTreeMap<String, String>,
}

/// Resolve `names` against `set`.
///
/// Fails on the first name that is absent or names a namespace. Repeated
/// names keep their first position.
pub fn build_shell(set: &PackageSet, names: &[String]) -> Result<ShellEnvironment, ShellError> {
  let mut seen = HashSet::new();
  let mut tools = Vec::with_capacity(names.len());

  for name in names {
    if !seen.insert(name.as_str()) {
      trace!(tool = %name, "duplicate tool ignored");
      continue;
    }
    let package = set
      .package(name)
      .ok_or_else(|| ShellError::UnresolvedTool { name: name.clone() })?;
    tools.push(ShellTool {
      name: name.clone(),
      version: package.version.clone(),
      bin: package.bin.clone(),
      description: package.description.clone(),
    });
  }

  debug!(tools = tools.len(), "shell environment built");
  Ok(ShellEnvironment {
    tools,
    env: BTreeMap::new(),
  })
}

impl ShellEnvironment {
  pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
    self.env = env;
    self
  }

  pub fn tool_names(&self) -> Vec<&str> {
    self.tools.iter().map(|t| t.name.as_str()).collect()
  }

  /// Distinct bin directories in tool order.
  pub fn path_entries(&self) -> Vec<&Path> {
    let mut seen = HashSet::new();
    self
      .tools
      .iter()
      .map(|t| t.bin.as_path())
      .filter(|bin| seen.insert(*bin))
      .collect()
  }

  /// The `PATH` value with the tool directories ahead of `inherited`.
  pub fn path_value(&self, inherited: Option<&OsStr>) -> Result<OsString, ShellError> {
    let mut entries: Vec<PathBuf> = self.path_entries().into_iter().map(Path::to_path_buf).collect();
    if let Some(inherited) = inherited {
      entries.extend(std::env::split_paths(inherited));
    }
    std::env::join_paths(entries).map_err(ShellError::InvalidPath)
  }

  /// Variables a child process receives on top of the inherited environment.
  pub fn child_env(&self, inherited_path: Option<&OsStr>) -> Result<Vec<(OsString, OsString)>, ShellError> {
    let mut vars = vec![
      (OsString::from("PATH"), self.path_value(inherited_path)?),
      (OsString::from(IN_SHELL_ENV), OsString::from("1")),
    ];
    vars.extend(self.env.iter().map(|(k, v)| (OsString::from(k), OsString::from(v))));
    Ok(vars)
  }

  /// A command running `program` inside the environment.
  pub fn command(&self, program: impl AsRef<OsStr>) -> Result<Command, ShellError> {
    let inherited = std::env::var_os("PATH");
    let mut cmd = Command::new(program);
    cmd.envs(self.child_env(inherited.as_deref())?);
    Ok(cmd)
  }

  /// Script that activates the environment when sourced by `shell`.
  pub fn activation_script(&self, shell: Shell) -> String {
    let mut lines = vec![shell.header().to_string(), shell.comment("generated by envpin")];

    // Prepending in reverse leaves the first tool first on PATH.
    for bin in self.path_entries().into_iter().rev() {
      lines.push(shell.prepend_path("PATH", &bin.to_string_lossy()));
    }
    lines.push(shell.export_var(IN_SHELL_ENV, "1"));
    for (name, value) in &self.env {
      lines.push(shell.export_var(name, value));
    }

    let mut script = lines.join("\n");
    script.push('\n');
    script
  }
}
