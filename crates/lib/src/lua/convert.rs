//! Conversion between Lua tables and package sets, and Lua overlays.

use std::collections::BTreeMap;
use std::path::PathBuf;

use mlua::prelude::*;

use crate::lua::globals::{PACKAGE_TYPE, mark, type_of};
use crate::lua::loaders::with_current_dir;
use crate::pkgs::overlay::{Overlay, OverlayError};
use crate::pkgs::{Attr, Package, PackageSet};

/// Read a package set from a table of packages and nested namespaces.
pub fn package_set_from_lua(table: &LuaTable) -> LuaResult<PackageSet> {
  Ok(PackageSet::from_attrs(attrs_from_lua(table, "")?))
}

fn attrs_from_lua(table: &LuaTable, prefix: &str) -> LuaResult<BTreeMap<String, Attr>> {
  let mut attrs = BTreeMap::new();
  for pair in table.pairs::<LuaValue, LuaValue>() {
    let (key, value) = pair?;
    let name = match key {
      LuaValue::String(s) => s.to_str()?.to_string(),
      other => {
        return Err(LuaError::external(format!(
          "package set keys must be strings, got {} under '{}'",
          other.type_name(),
          prefix
        )));
      }
    };
    let path = if prefix.is_empty() {
      name.clone()
    } else {
      format!("{prefix}.{name}")
    };

    let attr = match value {
      LuaValue::Table(t) => match type_of(&t).as_deref() {
        Some(PACKAGE_TYPE) => Attr::Package(package_from_lua(&t)?),
        None => Attr::Namespace(attrs_from_lua(&t, &path)?),
        Some(other) => {
          return Err(LuaError::external(format!("'{path}' is a {other}, not a package")));
        }
      },
      other => {
        return Err(LuaError::external(format!(
          "'{path}' must be a package or a namespace table, got {}",
          other.type_name()
        )));
      }
    };
    attrs.insert(name, attr);
  }
  Ok(attrs)
}

fn package_from_lua(t: &LuaTable) -> LuaResult<Package> {
  Ok(Package {
    version: t.get("version")?,
    bin: PathBuf::from(t.get::<String>("bin")?),
    description: t.get("description")?,
  })
}

pub fn package_to_lua(lua: &Lua, package: &Package) -> LuaResult<LuaTable> {
  let t = lua.create_table()?;
  t.set("bin", package.bin.to_string_lossy().into_owned())?;
  t.set("version", package.version.as_deref())?;
  t.set("description", package.description.as_deref())?;
  mark(lua, &t, PACKAGE_TYPE)?;
  Ok(t)
}

pub fn package_set_to_lua(lua: &Lua, set: &PackageSet) -> LuaResult<LuaTable> {
  attrs_to_lua(lua, set.attrs())
}

fn attrs_to_lua(lua: &Lua, attrs: &BTreeMap<String, Attr>) -> LuaResult<LuaTable> {
  let t = lua.create_table()?;
  for (name, attr) in attrs {
    let value = match attr {
      Attr::Package(p) => package_to_lua(lua, p)?,
      Attr::Namespace(children) => attrs_to_lua(lua, children)?,
    };
    t.set(name.as_str(), value)?;
  }
  Ok(t)
}

/// An overlay written in Lua as `function(prev, ctx)`.
///
/// `ctx.system` is the system being evaluated. While the function runs,
/// relative package paths resolve against `dir` when one is set.
pub struct LuaOverlay {
  name: String,
  lua: Lua,
  func: LuaFunction,
  system: String,
  dir: Option<PathBuf>,
}

impl LuaOverlay {
  pub fn new(lua: &Lua, name: &str, func: LuaFunction, system: &str) -> Self {
    Self {
      name: name.to_string(),
      lua: lua.clone(),
      func,
      system: system.to_string(),
      dir: None,
    }
  }

  pub fn with_dir(mut self, dir: PathBuf) -> Self {
    self.dir = Some(dir);
    self
  }

  fn call(&self, prev: &PackageSet) -> LuaResult<LuaValue> {
    let prev = package_set_to_lua(&self.lua, prev)?;
    let ctx = self.lua.create_table()?;
    ctx.set("system", self.system.as_str())?;
    match &self.dir {
      Some(dir) => with_current_dir(&self.lua, dir, || self.func.call((prev, ctx))),
      None => self.func.call((prev, ctx)),
    }
  }
}

impl Overlay for LuaOverlay {
  fn name(&self) -> &str {
    &self.name
  }

  fn apply(&self, prev: &PackageSet) -> Result<PackageSet, OverlayError> {
    let lua_err = |source: mlua::Error| OverlayError::Lua {
      overlay: self.name.clone(),
      source,
    };
    match self.call(prev).map_err(lua_err)? {
      LuaValue::Table(delta) => package_set_from_lua(&delta).map_err(lua_err),
      other => Err(OverlayError::InvalidResult {
        overlay: self.name.clone(),
        found: other.type_name().to_string(),
      }),
    }
  }
}

impl std::fmt::Debug for LuaOverlay {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LuaOverlay").field("name", &self.name).finish_non_exhaustive()
  }
}
