//! Descriptor evaluation.
//!
//! [`Evaluator::load`] evaluates a descriptor file:
//!
//! 1. Creates a Lua runtime with the `envpin` global for the chosen system
//! 2. Loads the descriptor and detects its form (flake or classic)
//! 3. Resolves the declared inputs (fetching git repos, archives and paths)
//! 4. Writes the lock file when it changed (flake form only)
//! 5. Evaluates every input's own descriptor in dependency order, handing each
//!    its resolved inputs
//! 6. Calls the root `outputs(inputs)` function
//!
//! Package sets, shells and targets are computed on demand from the outputs.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use mlua::prelude::*;
use tracing::{debug, info};

use crate::consts::DESCRIPTOR_FILENAME;
use crate::inputs::lock::LockFile;
use crate::inputs::resolve::{
  LockMode, ResolutionResult, ResolveError, ResolveOptions, resolve_inputs, save_lock_file_if_changed,
};
use crate::inputs::{InputDecls, ResolvedInput, ResolvedInputs};
use crate::lua::convert::{LuaOverlay, package_set_from_lua};
use crate::lua::descriptor::{ClassicDescriptor, DescriptorKind, descriptor_kind, load_descriptor, parse_input_decls};
use crate::lua::globals::{BUNDLE_TYPE, EMPTY_TYPE, INPUT_TYPE, type_of};
use crate::lua::loaders::with_current_dir;
use crate::lua::runtime::{RuntimeContext, create_runtime, prepend_package_path};
use crate::pkgs::PackageSet;
use crate::pkgs::overlay::{Overlay, OverlayError, StaticOverlay, apply_overlays};
use crate::platform::{PlatformError, resolve_system};
use crate::shell::{ShellEnvironment, ShellError, build_shell};
use crate::target::{Artifact, Bundle, DEFAULT_TARGET, Target, TargetError, Targets, build_target, default_target_name};

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
  #[error("failed to evaluate {}", path.display())]
  Load {
    path: PathBuf,
    #[source]
    source: LuaError,
  },

  #[error("outputs function of {} failed", path.display())]
  Outputs {
    path: PathBuf,
    #[source]
    source: LuaError,
  },

  #[error("failed to evaluate input '{name}'")]
  Input {
    name: String,
    #[source]
    source: LuaError,
  },

  #[error(transparent)]
  Lua(#[from] LuaError),

  #[error(transparent)]
  Resolve(#[from] ResolveError),

  #[error(transparent)]
  Platform(#[from] PlatformError),

  #[error(transparent)]
  Overlay(#[from] OverlayError),

  #[error(transparent)]
  Shell(#[from] ShellError),

  #[error(transparent)]
  Target(#[from] TargetError),

  #[error("no dev_shell defined for system '{system}'")]
  NoDevShell { system: String },

  #[error("input '{input}' exports no package_set")]
  NoPackageSet { input: String },

  #[error("input '{input}' exports no overlays.default")]
  MissingOverlay { input: String },

  #[error("target '{name}' is invalid: {message}")]
  InvalidTarget { name: String, message: String },
}

/// How a descriptor is evaluated.
#[derive(Debug, Clone)]
pub struct EvalOptions {
  /// System to evaluate for; `None` uses `ENVPIN_SYSTEM` or the detected platform.
  pub system: Option<String>,
  /// Lock mode and cache locations for flake descriptors.
  pub resolve: ResolveOptions,
  /// Write `envpin.lock` when the resolution changed it.
  pub write_lock: bool,
}

impl Default for EvalOptions {
  fn default() -> Self {
    Self {
      system: None,
      resolve: ResolveOptions::default(),
      write_lock: true,
    }
  }
}

impl EvalOptions {
  pub fn with_system(mut self, system: &str) -> Self {
    self.system = Some(system.to_string());
    self
  }

  pub fn with_resolve(mut self, resolve: ResolveOptions) -> Self {
    self.resolve = resolve;
    self
  }

  pub fn without_lock_write(mut self) -> Self {
    self.write_lock = false;
    self
  }
}

/// An evaluated descriptor.
pub struct Evaluator {
  lua: Lua,
  path: PathBuf,
  dir: PathBuf,
  kind: DescriptorKind,
  system: String,
  description: Option<String>,
  outputs: LuaTable,
  resolution: Option<ResolutionResult>,
}

impl std::fmt::Debug for Evaluator {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Evaluator")
      .field("path", &self.path)
      .field("kind", &self.kind)
      .field("system", &self.system)
      .finish_non_exhaustive()
  }
}

impl Evaluator {
  /// Evaluate the descriptor at `path`.
  pub fn load(path: &Path, options: &EvalOptions) -> Result<Self, EvalError> {
    let path = dunce::canonicalize(path).map_err(|e| EvalError::Load {
      path: path.to_path_buf(),
      source: LuaError::external(e),
    })?;
    let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    let system = resolve_system(options.system.as_deref())?;

    info!(path = %path.display(), system = %system, "evaluating descriptor");

    let load_err = |source: LuaError| EvalError::Load {
      path: path.clone(),
      source,
    };
    let lua = create_runtime(&RuntimeContext::new(&system, &dir)).map_err(load_err)?;
    let descriptor = load_descriptor(&lua, &path).map_err(load_err)?;
    let kind = descriptor_kind(&descriptor).map_err(load_err)?;
    let description: Option<String> = descriptor.get("description").map_err(load_err)?;
    debug!(kind = %kind, "descriptor loaded");

    let (outputs, resolution) = match kind {
      DescriptorKind::Flake => {
        let decls = parse_input_decls(descriptor.get("inputs").map_err(load_err)?).map_err(load_err)?;
        let resolution = resolve(&decls, &dir, &options.resolve)?;
        if let Some(result) = &resolution
          && options.write_lock
        {
          save_lock_file_if_changed(result, &dir)?;
        }

        let inputs = evaluate_inputs(&lua, &dir, resolution.as_ref())?;
        let outputs_fn: LuaFunction = descriptor.get("outputs").map_err(load_err)?;
        let outputs_err = |source: LuaError| EvalError::Outputs {
          path: path.clone(),
          source,
        };
        let outputs = match with_current_dir(&lua, &dir, || outputs_fn.call::<LuaValue>(inputs)).map_err(outputs_err)? {
          LuaValue::Table(t) => t,
          other => {
            return Err(outputs_err(LuaError::external(format!(
              "outputs must return a table, got {}",
              other.type_name()
            ))));
          }
        };
        (outputs, resolution)
      }
      DescriptorKind::Classic => {
        let classic = ClassicDescriptor::from_table(&descriptor).map_err(load_err)?;
        // Classic descriptors are never pinned: no lock is read or written.
        let resolve_options = ResolveOptions::unlocked().with_cache(options.resolve.cache.clone());
        let resolution = resolve(&classic.input_decls(), &dir, &resolve_options)?;
        let inputs = evaluate_inputs(&lua, &dir, resolution.as_ref())?;
        let outputs = classic_outputs(&lua, &classic, &inputs, &system)?;
        (outputs, resolution)
      }
    };

    Ok(Self {
      lua,
      path,
      dir,
      kind,
      system,
      description,
      outputs,
      resolution,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn kind(&self) -> DescriptorKind {
    self.kind
  }

  pub fn system(&self) -> &str {
    &self.system
  }

  pub fn description(&self) -> Option<&str> {
    self.description.as_deref()
  }

  /// The table returned by `outputs(inputs)`.
  pub fn outputs(&self) -> &LuaTable {
    &self.outputs
  }

  /// Resolved root inputs; empty when nothing is declared.
  pub fn inputs(&self) -> ResolvedInputs {
    self.resolution.as_ref().map(|r| r.inputs.clone()).unwrap_or_default()
  }

  pub fn resolution(&self) -> Option<&ResolutionResult> {
    self.resolution.as_ref()
  }

  pub fn lock_file(&self) -> Option<&LockFile> {
    match self.kind {
      DescriptorKind::Flake => self.resolution.as_ref().map(|r| &r.lock_file),
      DescriptorKind::Classic => None,
    }
  }

  /// The development shell for the evaluated system.
  pub fn dev_shell(&self) -> Result<ShellEnvironment, EvalError> {
    let spec = self
      .per_system("dev_shell")?
      .ok_or_else(|| EvalError::NoDevShell {
        system: self.system.clone(),
      })?;
    let set = self.package_set(&spec)?;
    let build_inputs: Vec<String> = spec.get::<Option<Vec<String>>>("build_inputs")?.unwrap_or_default();
    let env: BTreeMap<String, String> = spec.get::<Option<BTreeMap<String, String>>>("env")?.unwrap_or_default();
    Ok(build_shell(&set, &build_inputs)?.with_env(env))
  }

  /// Build targets declared under `packages.<system>`.
  pub fn targets(&self) -> Result<Targets, EvalError> {
    let mut targets = Targets::new();
    let Some(packages) = self.per_system("packages")? else {
      return Ok(targets);
    };

    for pair in packages.pairs::<String, LuaValue>() {
      let (name, value) = pair?;
      let invalid = |message: &str| EvalError::InvalidTarget {
        name: name.clone(),
        message: message.to_string(),
      };
      let LuaValue::Table(t) = value else {
        return Err(invalid("expected envpin.empty() or envpin.bundle{}"));
      };
      let target = match type_of(&t).as_deref() {
        Some(EMPTY_TYPE) => Target::Empty,
        Some(BUNDLE_TYPE) => {
          let set = self.package_set(&t)?;
          let paths: Vec<String> = t.get("paths")?;
          Target::Bundle(Bundle {
            tools: build_shell(&set, &paths)?.tools,
          })
        }
        _ => return Err(invalid("expected envpin.empty() or envpin.bundle{}")),
      };
      targets.insert(name, target);
    }
    Ok(targets)
  }

  /// Build `name`, or the default target when `None`.
  pub fn build_target(&self, name: Option<&str>, store_dir: &Path) -> Result<Artifact, EvalError> {
    let targets = self.targets()?;
    let name = match name {
      Some(name) => name,
      None => default_target_name(&targets).ok_or_else(|| TargetError::NotFound {
        name: DEFAULT_TARGET.to_string(),
        available: targets.keys().cloned().collect(),
      })?,
    };
    info!(target = %name, "building target");
    Ok(build_target(&targets, name, store_dir)?)
  }

  /// `outputs.<key>.<system>`, if present.
  fn per_system(&self, key: &str) -> Result<Option<LuaTable>, EvalError> {
    let Some(by_system) = self.outputs.get::<Option<LuaTable>>(key)? else {
      return Ok(None);
    };
    Ok(by_system.get::<Option<LuaTable>>(self.system.as_str())?)
  }

  /// The package set a shell or bundle spec describes: `pkgs` with `overlays` applied.
  fn package_set(&self, spec: &LuaTable) -> Result<PackageSet, EvalError> {
    let base = self.base_package_set(spec.get::<LuaValue>("pkgs")?)?;
    let mut overlays: Vec<Box<dyn Overlay>> = Vec::new();
    if let Some(list) = spec.get::<Option<LuaTable>>("overlays")? {
      for (i, value) in list.sequence_values::<LuaValue>().enumerate() {
        overlays.push(self.overlay(i, value?)?);
      }
    }
    Ok(apply_overlays(&base, &overlays)?)
  }

  fn base_package_set(&self, pkgs: LuaValue) -> Result<PackageSet, EvalError> {
    match pkgs {
      LuaValue::Nil => Ok(PackageSet::new()),
      LuaValue::Function(f) => self.call_package_set(&f),
      LuaValue::Table(t) => match input_node(&t) {
        Some(node) => match t.get::<LuaValue>("package_set")? {
          LuaValue::Function(f) => self.call_package_set(&f),
          LuaValue::Table(set) => Ok(package_set_from_lua(&set)?),
          _ => Err(EvalError::NoPackageSet { input: node }),
        },
        None => Ok(package_set_from_lua(&t)?),
      },
      other => Err(
        LuaError::external(format!(
          "pkgs must be an input, a table or a function, got {}",
          other.type_name()
        ))
        .into(),
      ),
    }
  }

  /// Directory that relative package paths inside `f` resolve against.
  ///
  /// This is the deepest of the root directory and the resolved input
  /// directories that holds the file defining `f`. Functions not loaded from
  /// a file fall back to the root directory.
  fn function_dir(&self, f: &LuaFunction) -> PathBuf {
    let Some(file) = f.info().source.and_then(|s| s.strip_prefix('@').map(PathBuf::from)) else {
      return self.dir.clone();
    };
    let input_dirs = self
      .resolution
      .iter()
      .flat_map(|r| r.nodes.values())
      .map(|resolved| dunce::canonicalize(&resolved.path).unwrap_or_else(|_| resolved.path.clone()));
    std::iter::once(self.dir.clone())
      .chain(input_dirs)
      .filter(|dir| file.starts_with(dir))
      .max_by_key(|dir| dir.components().count())
      .unwrap_or_else(|| self.dir.clone())
  }

  fn call_package_set(&self, f: &LuaFunction) -> Result<PackageSet, EvalError> {
    let ctx = self.lua.create_table()?;
    ctx.set("system", self.system.as_str())?;
    let dir = self.function_dir(f);
    match with_current_dir(&self.lua, &dir, || f.call::<LuaValue>(ctx))? {
      LuaValue::Table(t) => Ok(package_set_from_lua(&t)?),
      other => Err(LuaError::external(format!("package_set must return a table, got {}", other.type_name())).into()),
    }
  }

  fn overlay(&self, index: usize, value: LuaValue) -> Result<Box<dyn Overlay>, EvalError> {
    let name = format!("overlays[{}]", index + 1);
    match value {
      LuaValue::Function(f) => {
        let dir = self.function_dir(&f);
        Ok(Box::new(LuaOverlay::new(&self.lua, &name, f, &self.system).with_dir(dir)))
      }
      LuaValue::Table(t) => match input_node(&t) {
        Some(node) => {
          let default = t
            .get::<Option<LuaTable>>("overlays")?
            .map(|o| o.get::<LuaValue>("default"))
            .transpose()?
            .unwrap_or(LuaValue::Nil);
          let name = format!("{node}.overlays.default");
          match default {
            LuaValue::Function(f) => {
              let dir = self.function_dir(&f);
              Ok(Box::new(LuaOverlay::new(&self.lua, &name, f, &self.system).with_dir(dir)))
            }
            LuaValue::Table(delta) => Ok(Box::new(StaticOverlay::new(&name, package_set_from_lua(&delta)?))),
            _ => Err(EvalError::MissingOverlay { input: node }),
          }
        }
        None => Ok(Box::new(StaticOverlay::new(&name, package_set_from_lua(&t)?))),
      },
      other => Err(
        LuaError::external(format!(
          "{name} must be a function, a table or an input, got {}",
          other.type_name()
        ))
        .into(),
      ),
    }
  }
}

fn resolve(decls: &InputDecls, dir: &Path, options: &ResolveOptions) -> Result<Option<ResolutionResult>, EvalError> {
  if decls.is_empty() {
    debug!("no inputs declared");
    return Ok(None);
  }
  if matches!(options.lock, LockMode::Unlocked) {
    debug!("resolving without lock file");
  }
  Ok(Some(resolve_inputs(decls, dir, options)?))
}

/// Evaluate every resolved input in dependency order.
///
/// Returns the table handed to the root `outputs`. Inputs that follow another
/// input receive the very same table as their target.
fn evaluate_inputs(lua: &Lua, root_dir: &Path, resolution: Option<&ResolutionResult>) -> Result<LuaTable, EvalError> {
  let root = lua.create_table()?;
  let Some(resolution) = resolution else {
    return Ok(root);
  };

  let input_dirs: Vec<&Path> = resolution
    .order
    .iter()
    .filter_map(|node| resolution.nodes.get(node))
    .map(|r| r.path.as_path())
    .collect();
  prepend_package_path(lua, std::iter::once(root_dir).chain(input_dirs))?;

  let mut evaluated: HashMap<String, LuaTable> = HashMap::new();
  for node in &resolution.order {
    let Some(resolved) = resolution.nodes.get(node) else {
      continue;
    };
    let deps = inputs_table(lua, &resolved.inputs, &evaluated)?;
    let entry = input_entry(lua, resolved, deps).map_err(|e| EvalError::Input {
      name: node.clone(),
      source: e,
    })?;
    debug!(input = %node, rev = %resolved.rev, "evaluated input");
    evaluated.insert(node.clone(), entry);
  }

  for (name, resolved) in &resolution.inputs {
    if let Some(entry) = evaluated.get(&resolved.node) {
      root.set(name.as_str(), entry.clone())?;
    }
  }
  Ok(root)
}

fn inputs_table(lua: &Lua, inputs: &ResolvedInputs, evaluated: &HashMap<String, LuaTable>) -> LuaResult<LuaTable> {
  let t = lua.create_table()?;
  for (name, resolved) in inputs {
    if let Some(entry) = evaluated.get(&resolved.node) {
      t.set(name.as_str(), entry.clone())?;
    }
  }
  Ok(t)
}

/// The table an input contributes: its evaluated outputs plus `path`, `rev`
/// and `inputs`.
fn input_entry(lua: &Lua, resolved: &ResolvedInput, deps: LuaTable) -> LuaResult<LuaTable> {
  let descriptor_path = resolved.path.join(DESCRIPTOR_FILENAME);
  let entry = if descriptor_path.is_file() {
    let descriptor = load_descriptor(lua, &descriptor_path)?;
    match descriptor.get::<LuaValue>("outputs")? {
      LuaValue::Function(outputs) => {
        match with_current_dir(lua, &resolved.path, || outputs.call::<LuaValue>(deps.clone()))? {
          LuaValue::Table(t) => t,
          other => {
            return Err(LuaError::external(format!(
              "outputs must return a table, got {}",
              other.type_name()
            )));
          }
        }
      }
      _ => descriptor,
    }
  } else {
    lua.create_table()?
  };

  entry.set("path", resolved.path.to_string_lossy().into_owned())?;
  entry.set("rev", resolved.rev.as_str())?;
  entry.set("inputs", deps)?;

  let mt = lua.create_table()?;
  mt.set("__type", INPUT_TYPE)?;
  mt.set("__node", resolved.node.as_str())?;
  entry.set_metatable(Some(mt))?;
  Ok(entry)
}

/// Graph path of an input entry, or `None` for other tables.
fn input_node(t: &LuaTable) -> Option<String> {
  if type_of(t).as_deref() != Some(INPUT_TYPE) {
    return None;
  }
  t.metatable().and_then(|mt| mt.get::<String>("__node").ok())
}

/// Outputs equivalent to a classic descriptor: one dev shell for `system`.
fn classic_outputs(lua: &Lua, classic: &ClassicDescriptor, inputs: &LuaTable, system: &str) -> LuaResult<LuaTable> {
  let shell = lua.create_table()?;
  shell.set("pkgs", inputs.get::<LuaValue>("pkgs")?)?;

  let overlays = lua.create_table()?;
  for i in 0..classic.overlays.len() {
    let name = crate::lua::descriptor::overlay_input_name(i);
    overlays.push(inputs.get::<LuaValue>(name.as_str())?)?;
  }
  shell.set("overlays", overlays)?;
  shell.set("build_inputs", classic.build_inputs.clone())?;
  shell.set("env", classic.env.clone())?;

  let dev_shell = lua.create_table()?;
  dev_shell.set(system, shell)?;
  let outputs = lua.create_table()?;
  outputs.set("dev_shell", dev_shell)?;
  Ok(outputs)
}
