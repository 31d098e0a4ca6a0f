//! File loading with a per-file `__dir` variable.
//!
//! Every chunk loaded through [`load_file_with_dir`], `dofile` or `require`
//! runs in its own environment table whose `__dir` holds the chunk's
//! directory. Globals are reached through the environment's metatable.
//! Relative `dofile` paths and relative package `bin` paths resolve against
//! the directory recorded by [`with_current_dir`].

use std::fs;
use std::path::{Path, PathBuf};

use mlua::prelude::*;

const CURRENT_DIR_KEY: &str = "envpin.current_dir";

struct Chunk {
  path: PathBuf,
  dir: String,
  source: String,
}

fn read_chunk(path: &Path) -> LuaResult<Chunk> {
  let path = dunce::canonicalize(path)
    .map_err(|e| LuaError::external(format!("cannot resolve '{}': {}", path.display(), e)))?;
  let source =
    fs::read_to_string(&path).map_err(|e| LuaError::external(format!("cannot read '{}': {}", path.display(), e)))?;
  let dir = path.parent().unwrap_or(Path::new(".")).to_string_lossy().into_owned();
  Ok(Chunk { path, dir, source })
}

fn chunk_env(lua: &Lua, dir: &str) -> LuaResult<LuaTable> {
  let env = lua.create_table()?;
  env.set("__dir", dir)?;
  let mt = lua.create_table()?;
  mt.set("__index", lua.globals())?;
  mt.set("__newindex", lua.globals())?;
  env.set_metatable(Some(mt))?;
  Ok(env)
}

/// Evaluate the file at `path` with `__dir` set to its directory.
pub fn load_file_with_dir(lua: &Lua, path: &Path) -> LuaResult<LuaValue> {
  let chunk = read_chunk(path)?;
  let env = chunk_env(lua, &chunk.dir)?;
  with_current_dir(lua, Path::new(&chunk.dir), || {
    lua
      .load(&chunk.source)
      .set_name(format!("@{}", chunk.path.display()))
      .set_environment(env)
      .eval::<LuaValue>()
  })
}

/// Run `f` with `dir` as the directory relative paths resolve against.
///
/// The previous directory is restored afterwards, even when `f` fails.
pub fn with_current_dir<T>(lua: &Lua, dir: &Path, f: impl FnOnce() -> LuaResult<T>) -> LuaResult<T> {
  let prev: Option<String> = lua.named_registry_value(CURRENT_DIR_KEY)?;
  lua.set_named_registry_value(CURRENT_DIR_KEY, dir.to_string_lossy().into_owned())?;
  let result = f();
  // Restoring must not mask an error from `f`.
  let _ = lua.set_named_registry_value(CURRENT_DIR_KEY, prev);
  result
}

/// The directory of the chunk currently executing, if any.
pub fn current_dir(lua: &Lua) -> LuaResult<Option<PathBuf>> {
  Ok(lua.named_registry_value::<Option<String>>(CURRENT_DIR_KEY)?.map(PathBuf::from))
}

fn resolve_relative(lua: &Lua, path: &str) -> LuaResult<PathBuf> {
  let path = Path::new(path);
  if path.is_absolute() {
    return Ok(path.to_path_buf());
  }
  Ok(match current_dir(lua)? {
    Some(dir) => dir.join(path),
    None => path.to_path_buf(),
  })
}

/// `package.searchers[2]` replacement: finds modules via `package.searchpath`
/// and loads them with [`load_file_with_dir`].
fn lua_searcher(lua: &Lua) -> LuaResult<LuaFunction> {
  lua.create_function(|lua, modname: String| {
    let package: LuaTable = lua.globals().get("package")?;
    let search_path: String = package.get("path")?;
    let searchpath: LuaFunction = package.get("searchpath")?;
    let (found, _): (Option<String>, Option<String>) = searchpath.call((modname.as_str(), search_path))?;

    let Some(file) = found else {
      return Ok((LuaValue::Nil, LuaValue::String(lua.create_string(format!("\n\tno file for module '{modname}'"))?)));
    };

    let target = PathBuf::from(&file);
    let loader = lua.create_function(move |lua, _: LuaMultiValue| load_file_with_dir(lua, &target))?;
    Ok((LuaValue::Function(loader), LuaValue::String(lua.create_string(&file)?)))
  })
}

fn dofile(lua: &Lua) -> LuaResult<LuaFunction> {
  lua.create_function(|lua, path: Option<String>| {
    let path = path.ok_or_else(|| LuaError::external("dofile() requires a path"))?;
    let resolved = resolve_relative(lua, &path)?;
    load_file_with_dir(lua, &resolved)
  })
}

/// Route `require` and `dofile` through the `__dir`-aware loader.
pub fn install_loaders(lua: &Lua) -> LuaResult<()> {
  let package: LuaTable = lua.globals().get("package")?;
  let searchers: LuaTable = package.get("searchers")?;
  searchers.set(2, lua_searcher(lua)?)?;
  lua.globals().set("dofile", dofile(lua)?)?;
  Ok(())
}
