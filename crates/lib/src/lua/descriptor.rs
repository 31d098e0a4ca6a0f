//! Descriptor files.
//!
//! A descriptor returns a table. The flake form carries an `outputs`
//! function and optionally pinned `inputs`:
//!
//! ```lua
//! return {
//!   inputs = {
//!     nixpkgs = "git:https://example.com/pkgs.git#master",
//!     ["rust-overlay"] = {
//!       url = "git:https://example.com/rust-overlay.git",
//!       inputs = { nixpkgs = { follows = "nixpkgs" } },
//!     },
//!   },
//!   outputs = function(inputs) ... end,
//! }
//! ```
//!
//! The classic form names its package set and overlays by URL and lists the
//! shell tools directly.

use std::collections::BTreeMap;
use std::path::Path;

use mlua::prelude::*;
use tracing::trace;

use crate::consts::DESCRIPTOR_FILENAME;
use crate::inputs::{InputDecl, InputDecls, InputOverride};
use crate::lua::loaders::load_file_with_dir;
use crate::lua::runtime::{RuntimeContext, create_runtime};
use crate::platform::platform_triple;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
  /// Pinned inputs and an `outputs` function.
  Flake,
  /// Unpinned `pkgs`, `overlays` and `build_inputs`.
  Classic,
}

impl std::fmt::Display for DescriptorKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      DescriptorKind::Flake => write!(f, "flake"),
      DescriptorKind::Classic => write!(f, "classic"),
    }
  }
}

/// Evaluate a descriptor file and return its table.
pub fn load_descriptor(lua: &Lua, path: &Path) -> LuaResult<LuaTable> {
  match load_file_with_dir(lua, path)? {
    LuaValue::Table(t) => Ok(t),
    other => Err(LuaError::external(format!(
      "{} must return a table, got {}",
      path.display(),
      other.type_name()
    ))),
  }
}

pub fn descriptor_kind(descriptor: &LuaTable) -> LuaResult<DescriptorKind> {
  match descriptor.get::<LuaValue>("outputs")? {
    LuaValue::Function(_) => Ok(DescriptorKind::Flake),
    LuaValue::Nil if descriptor.contains_key("inputs")? => {
      Err(LuaError::external("descriptor declares inputs but no outputs function"))
    }
    LuaValue::Nil => Ok(DescriptorKind::Classic),
    other => Err(LuaError::external(format!(
      "outputs must be a function, got {}",
      other.type_name()
    ))),
  }
}

/// Read the `inputs` declared by the descriptor in `dir`.
///
/// A directory without a descriptor declares no inputs.
pub fn read_input_decls(dir: &Path) -> LuaResult<InputDecls> {
  let path = dir.join(DESCRIPTOR_FILENAME);
  if !path.is_file() {
    trace!(dir = %dir.display(), "no descriptor, no transitive inputs");
    return Ok(InputDecls::new());
  }

  let system = platform_triple().unwrap_or_default();
  let lua = create_runtime(&RuntimeContext::new(&system, dir))?;
  let descriptor = load_descriptor(&lua, &path)?;
  parse_input_decls(descriptor.get("inputs")?)
}

/// Parse the value of a descriptor's `inputs` field.
pub fn parse_input_decls(value: LuaValue) -> LuaResult<InputDecls> {
  let table = match value {
    LuaValue::Nil => return Ok(InputDecls::new()),
    LuaValue::Table(t) => t,
    other => {
      return Err(LuaError::external(format!(
        "inputs must be a table, got {}",
        other.type_name()
      )));
    }
  };

  let mut decls = InputDecls::new();
  for pair in table.pairs::<String, LuaValue>() {
    let (name, value) = pair?;
    let decl = parse_input_decl(&name, value)?;
    decls.insert(name, decl);
  }
  Ok(decls)
}

fn parse_input_decl(name: &str, value: LuaValue) -> LuaResult<InputDecl> {
  match value {
    LuaValue::String(url) => Ok(InputDecl::Url(url.to_str()?.to_string())),
    LuaValue::Table(table) => {
      let url: Option<String> = table.get("url")?;
      let inputs = match table.get::<LuaValue>("inputs")? {
        LuaValue::Nil => BTreeMap::new(),
        LuaValue::Table(overrides) => {
          let mut parsed = BTreeMap::new();
          for pair in overrides.pairs::<String, LuaValue>() {
            let (dep, value) = pair?;
            let override_ = parse_override(name, &dep, value)?;
            parsed.insert(dep, override_);
          }
          parsed
        }
        _ => {
          return Err(LuaError::external(format!("input '{name}': 'inputs' must be a table")));
        }
      };
      Ok(InputDecl::Extended { url, inputs })
    }
    _ => Err(LuaError::external(format!(
      "input '{name}' must be a URL string or a table"
    ))),
  }
}

fn parse_override(input: &str, dep: &str, value: LuaValue) -> LuaResult<InputOverride> {
  match value {
    LuaValue::String(url) => Ok(InputOverride::Url(url.to_str()?.to_string())),
    LuaValue::Table(table) => {
      if let Some(path) = table.get::<Option<String>>("follows")? {
        return Ok(InputOverride::Follows(path));
      }
      if let Some(url) = table.get::<Option<String>>("url")? {
        return Ok(InputOverride::Url(url));
      }
      Err(LuaError::external(format!(
        "input '{input}': override '{dep}' needs 'url' or 'follows'"
      )))
    }
    _ => Err(LuaError::external(format!(
      "input '{input}': override '{dep}' must be a URL string or a table"
    ))),
  }
}

/// The classic descriptor form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassicDescriptor {
  /// Location of the package set.
  pub pkgs: Option<String>,
  /// Locations of overlay sources, each exporting `overlays.default`.
  pub overlays: Vec<String>,
  pub build_inputs: Vec<String>,
  pub env: BTreeMap<String, String>,
  pub description: Option<String>,
}

impl ClassicDescriptor {
  pub fn from_table(descriptor: &LuaTable) -> LuaResult<Self> {
    Ok(Self {
      pkgs: descriptor.get("pkgs")?,
      overlays: descriptor.get::<Option<Vec<String>>>("overlays")?.unwrap_or_default(),
      build_inputs: descriptor.get::<Option<Vec<String>>>("build_inputs")?.unwrap_or_default(),
      env: descriptor.get::<Option<BTreeMap<String, String>>>("env")?.unwrap_or_default(),
      description: descriptor.get("description")?,
    })
  }

  /// Input declarations for the classic sources: `pkgs` and `overlay1..N`.
  pub fn input_decls(&self) -> InputDecls {
    let mut decls = InputDecls::new();
    if let Some(pkgs) = &self.pkgs {
      decls.insert("pkgs".to_string(), InputDecl::Url(pkgs.clone()));
    }
    for (i, url) in self.overlays.iter().enumerate() {
      decls.insert(overlay_input_name(i), InputDecl::Url(url.clone()));
    }
    decls
  }
}

/// Input name given to the `index`th classic overlay.
pub fn overlay_input_name(index: usize) -> String {
  format!("overlay{}", index + 1)
}
