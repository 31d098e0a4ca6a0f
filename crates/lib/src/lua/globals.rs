//! The `envpin` global table.
//!
//! - `envpin.system` - System triple being evaluated (e.g. "x86_64-linux")
//! - `envpin.default_systems` - Systems `each_default_system` iterates
//! - `envpin.each_system(systems, fn)` / `envpin.each_default_system(fn)` -
//!   call `fn(system)` per system and transpose the results into
//!   `{ <key> = { <system> = value } }`
//! - `envpin.package{ version, bin, description }` - Declare a package
//! - `envpin.empty()` - Placeholder build target
//! - `envpin.bundle{ pkgs, overlays, paths }` - Target linking tool binaries
//!
//! Values built by these functions carry a `__type` marker in their metatable.

use std::path::Path;

use mlua::prelude::*;

use crate::lua::loaders;
use crate::lua::runtime::RuntimeContext;
use crate::platform::DEFAULT_SYSTEMS;

pub const PACKAGE_TYPE: &str = "envpin.package";
pub const EMPTY_TYPE: &str = "envpin.empty";
pub const BUNDLE_TYPE: &str = "envpin.bundle";
/// Marks the per-input tables passed to `outputs(inputs)`.
pub const INPUT_TYPE: &str = "envpin.input";

/// Tag `table` with a `__type` marker.
pub fn mark(lua: &Lua, table: &LuaTable, type_name: &str) -> LuaResult<()> {
  let mt = lua.create_table()?;
  mt.set("__type", type_name)?;
  table.set_metatable(Some(mt))?;
  Ok(())
}

/// The `__type` marker of `table`, if it has one.
pub fn type_of(table: &LuaTable) -> Option<String> {
  table.metatable().and_then(|mt| mt.get::<String>("__type").ok())
}

pub fn register_globals(lua: &Lua, ctx: &RuntimeContext) -> LuaResult<()> {
  let envpin = lua.create_table()?;

  envpin.set("system", ctx.system.as_str())?;
  envpin.set("default_systems", lua.create_sequence_from(DEFAULT_SYSTEMS.iter().copied())?)?;

  envpin.set(
    "each_system",
    lua.create_function(|lua, (systems, f): (Vec<String>, LuaFunction)| each_system(lua, &systems, &f))?,
  )?;
  envpin.set(
    "each_default_system",
    lua.create_function(|lua, f: LuaFunction| {
      let systems: Vec<String> = DEFAULT_SYSTEMS.iter().map(|s| s.to_string()).collect();
      each_system(lua, &systems, &f)
    })?,
  )?;

  let root_dir = ctx.root_dir.clone();
  envpin.set(
    "package",
    lua.create_function(move |lua, spec: LuaTable| package(lua, &spec, &root_dir))?,
  )?;

  envpin.set(
    "empty",
    lua.create_function(|lua, ()| {
      let t = lua.create_table()?;
      mark(lua, &t, EMPTY_TYPE)?;
      Ok(t)
    })?,
  )?;

  envpin.set("bundle", lua.create_function(|lua, spec: LuaTable| bundle(lua, &spec))?)?;

  lua.globals().set("envpin", envpin)?;
  Ok(())
}

fn each_system(lua: &Lua, systems: &[String], f: &LuaFunction) -> LuaResult<LuaTable> {
  let out = lua.create_table()?;
  for system in systems {
    let result = match f.call::<LuaValue>(system.as_str())? {
      LuaValue::Table(t) => t,
      other => {
        return Err(LuaError::external(format!(
          "each_system callback must return a table for '{}', got {}",
          system,
          other.type_name()
        )));
      }
    };

    for pair in result.pairs::<LuaValue, LuaValue>() {
      let (key, value) = pair?;
      let slot = match out.get::<Option<LuaTable>>(key.clone())? {
        Some(slot) => slot,
        None => {
          let slot = lua.create_table()?;
          out.set(key, slot.clone())?;
          slot
        }
      };
      slot.set(system.as_str(), value)?;
    }
  }
  Ok(out)
}

fn package(lua: &Lua, spec: &LuaTable, root_dir: &Path) -> LuaResult<LuaTable> {
  let bin: String = spec
    .get::<Option<String>>("bin")?
    .ok_or_else(|| LuaError::external("envpin.package requires a 'bin' directory"))?;
  let version: Option<String> = spec.get("version")?;
  let description: Option<String> = spec.get("description")?;

  let bin_path = Path::new(&bin);
  let bin = if bin_path.is_absolute() {
    bin_path.to_path_buf()
  } else {
    let base = loaders::current_dir(lua)?.unwrap_or_else(|| root_dir.to_path_buf());
    base.join(bin_path)
  };

  let t = lua.create_table()?;
  t.set("bin", bin.to_string_lossy().into_owned())?;
  t.set("version", version)?;
  t.set("description", description)?;
  mark(lua, &t, PACKAGE_TYPE)?;
  Ok(t)
}

fn bundle(lua: &Lua, spec: &LuaTable) -> LuaResult<LuaTable> {
  let paths: LuaValue = spec.get("paths")?;
  if !matches!(paths, LuaValue::Table(_)) {
    return Err(LuaError::external("envpin.bundle requires a 'paths' list of tool names"));
  }

  let t = lua.create_table()?;
  t.set("pkgs", spec.get::<LuaValue>("pkgs")?)?;
  t.set("overlays", spec.get::<LuaValue>("overlays")?)?;
  t.set("paths", paths)?;
  mark(lua, &t, BUNDLE_TYPE)?;
  Ok(t)
}
