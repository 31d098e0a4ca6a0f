use std::path::{Path, PathBuf};

use mlua::prelude::*;

use crate::lua::{globals, loaders};

/// Values a runtime exposes through the `envpin` global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeContext {
  /// System triple descriptors are evaluated for.
  pub system: String,
  /// Directory of the root descriptor.
  pub root_dir: PathBuf,
}

impl RuntimeContext {
  pub fn new(system: &str, root_dir: &Path) -> Self {
    Self {
      system: system.to_string(),
      root_dir: root_dir.to_path_buf(),
    }
  }
}

/// Create a Lua state with the `envpin` global and `__dir`-aware loaders.
pub fn create_runtime(ctx: &RuntimeContext) -> LuaResult<Lua> {
  let lua = Lua::new();
  loaders::install_loaders(&lua)?;
  globals::register_globals(&lua, ctx)?;
  prepend_package_path(&lua, [ctx.root_dir.as_path()])?;
  Ok(lua)
}

/// Make `<dir>/lua/?.lua` and `<dir>/lua/?/init.lua` requirable for each dir.
///
/// Earlier dirs take precedence.
pub fn prepend_package_path<'a>(lua: &Lua, dirs: impl IntoIterator<Item = &'a Path>) -> LuaResult<()> {
  let package: LuaTable = lua.globals().get("package")?;
  let current: String = package.get("path")?;

  let mut entries = Vec::new();
  for dir in dirs {
    let lua_dir = dir.join("lua");
    entries.push(lua_dir.join("?.lua").to_string_lossy().into_owned());
    entries.push(lua_dir.join("?").join("init.lua").to_string_lossy().into_owned());
  }
  if entries.is_empty() {
    return Ok(());
  }

  entries.push(current);
  package.set("path", entries.join(";"))
}
