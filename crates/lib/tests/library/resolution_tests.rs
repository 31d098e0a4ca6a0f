//! Input resolution and lock file behaviour through the public API.

use std::collections::HashSet;

use envpin_lib::eval::EvalError;
use envpin_lib::inputs::lock::{LOCK_FILENAME, LockFile};
use envpin_lib::inputs::resolve::{
  LockMode, ResolutionResult, ResolveError, ResolveOptions, resolve_inputs, save_lock_file_if_changed,
};
use envpin_lib::lua::descriptor::read_input_decls;
use tempfile::TempDir;

use super::common::{cache, evaluate, write_file, write_nixpkgs, write_rcalc};

fn resolve(temp: &TempDir, project: &str, lock: LockMode) -> Result<ResolutionResult, ResolveError> {
  let dir = temp.path().join(project);
  let decls = read_input_decls(&dir).unwrap();
  let options = ResolveOptions::default().with_cache(cache(temp)).with_lock(lock);
  resolve_inputs(&decls, &dir, &options)
}

fn locked() -> LockMode {
  LockMode::Locked { force_update: None }
}

#[test]
fn resolution_is_idempotent() {
  let temp = TempDir::new().unwrap();
  write_rcalc(temp.path(), r#""cargo-watch""#);

  let first = resolve(&temp, "rcalc", locked()).unwrap();
  assert!(first.lock_changed);
  save_lock_file_if_changed(&first, &temp.path().join("rcalc")).unwrap();

  let second = resolve(&temp, "rcalc", locked()).unwrap();
  assert!(!second.lock_changed);
  assert_eq!(first.inputs, second.inputs);
  assert_eq!(first.lock_file, second.lock_file);
}

#[test]
fn order_puts_dependencies_first() {
  let temp = TempDir::new().unwrap();
  write_nixpkgs(temp.path());
  write_file(
    temp.path(),
    "tool/envpin.lua",
    r#"return { inputs = { nixpkgs = "path:../nixpkgs" }, outputs = function() return {} end }"#,
  );
  write_file(
    temp.path(),
    "app/envpin.lua",
    r#"return { inputs = { tool = "path:../tool" }, outputs = function() return {} end }"#,
  );

  let result = resolve(&temp, "app", LockMode::Unlocked).unwrap();

  assert_eq!(result.order, vec!["tool/nixpkgs", "tool"]);
  assert_eq!(result.inputs["tool"].inputs["nixpkgs"].node, "tool/nixpkgs");
  assert!(!result.lock_changed);
}

#[test]
fn dangling_follows_is_unresolved_reference() {
  let temp = TempDir::new().unwrap();
  write_rcalc(temp.path(), "");
  write_file(
    temp.path(),
    "app/envpin.lua",
    r#"
return {
  inputs = {
    ["rust-overlay"] = {
      url = "path:../rust-overlay",
      inputs = {
        nixpkgs = { follows = "nixpkgs" },
        ["flake-utils"] = { follows = "flake-utils" },
      },
    },
  },
  outputs = function() return {} end,
}
"#,
  );

  let err = resolve(&temp, "app", locked()).unwrap_err();
  assert!(
    matches!(err, ResolveError::UnresolvedReference { ref from, .. } if from.starts_with("rust-overlay/")),
    "got {err}"
  );
}

#[test]
fn circular_follows_detected() {
  let temp = TempDir::new().unwrap();
  for name in ["a", "b"] {
    write_file(
      temp.path(),
      &format!("{name}/envpin.lua"),
      r#"return { inputs = { utils = "path:./utils" }, outputs = function() return {} end }"#,
    );
  }
  write_file(
    temp.path(),
    "app/envpin.lua",
    r#"
return {
  inputs = {
    a = { url = "path:../a", inputs = { utils = { follows = "b/utils" } } },
    b = { url = "path:../b", inputs = { utils = { follows = "a/utils" } } },
  },
  outputs = function() return {} end,
}
"#,
  );

  let err = resolve(&temp, "app", locked()).unwrap_err();
  assert!(matches!(err, ResolveError::CircularFollows { .. }), "got {err}");
}

#[test]
fn missing_path_input_is_fetch_error() {
  let temp = TempDir::new().unwrap();
  write_file(
    temp.path(),
    "app/envpin.lua",
    r#"return { inputs = { pkgs = "path:../missing" }, outputs = function() return {} end }"#,
  );

  let err = resolve(&temp, "app", locked()).unwrap_err();
  assert!(matches!(err, ResolveError::Fetch { ref name, .. } if name == "pkgs"));
}

#[test]
fn lock_mismatch_on_changed_url() {
  let temp = TempDir::new().unwrap();
  write_nixpkgs(temp.path());
  let descriptor = write_file(
    temp.path(),
    "app/envpin.lua",
    r#"return { inputs = { pkgs = "path:../nixpkgs" }, outputs = function() return {} end }"#,
  );
  evaluate(&temp, &descriptor).unwrap();

  write_file(
    temp.path(),
    "app/envpin.lua",
    r#"return { inputs = { pkgs = "path:../nixpkgs/" }, outputs = function() return {} end }"#,
  );

  let err = evaluate(&temp, &descriptor).unwrap_err();
  assert!(matches!(
    err,
    EvalError::Resolve(ResolveError::LockMismatch { ref name, .. }) if name == "pkgs"
  ));

  let forced = LockMode::Locked {
    force_update: Some(HashSet::from(["pkgs".to_string()])),
  };
  let result = resolve(&temp, "app", forced).unwrap();
  assert!(result.lock_changed);
  assert_eq!(result.lock_file.get("pkgs").unwrap().url.as_deref(), Some("path:../nixpkgs/"));
}

#[test]
fn stale_nodes_are_pruned() {
  let temp = TempDir::new().unwrap();
  write_rcalc(temp.path(), "");
  let dir = temp.path().join("rcalc");
  let first = resolve(&temp, "rcalc", locked()).unwrap();
  save_lock_file_if_changed(&first, &dir).unwrap();

  write_file(
    temp.path(),
    "rcalc/envpin.lua",
    r#"return { inputs = { nixpkgs = "path:../nixpkgs" }, outputs = function() return {} end }"#,
  );
  let second = resolve(&temp, "rcalc", locked()).unwrap();
  save_lock_file_if_changed(&second, &dir).unwrap();

  let lock = LockFile::load(&dir.join(LOCK_FILENAME)).unwrap().unwrap();
  assert_eq!(lock.input_paths(), vec!["nixpkgs"]);
}

#[test]
fn classic_descriptor_writes_no_lock() {
  let temp = TempDir::new().unwrap();
  write_nixpkgs(temp.path());
  let descriptor = write_file(
    temp.path(),
    "app/shell.lua",
    r#"return { pkgs = "path:../nixpkgs", build_inputs = { "cargo-bloat" } }"#,
  );

  let evaluator = evaluate(&temp, &descriptor).unwrap();

  assert_eq!(evaluator.dev_shell().unwrap().tool_names(), vec!["cargo-bloat"]);
  assert!(evaluator.lock_file().is_none());
  assert!(!temp.path().join("app").join(LOCK_FILENAME).exists());
}
