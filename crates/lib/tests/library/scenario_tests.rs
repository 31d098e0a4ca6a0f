//! End-to-end evaluation of the `rcalc` project.

use envpin_lib::eval::EvalError;
use envpin_lib::inputs::lock::LOCK_FILENAME;
use envpin_lib::shell::ShellError;
use envpin_lib::target::Target;
use tempfile::TempDir;

use super::common::{evaluate, write_rcalc};

const TOOLS: &str = r#""rust-bin.nightly.latest.default", "cargo-watch", "cargo-bloat""#;

#[test]
fn follows_share_top_level_inputs() {
  let temp = TempDir::new().unwrap();
  let descriptor = write_rcalc(temp.path(), TOOLS);

  let evaluator = evaluate(&temp, &descriptor).unwrap();
  let inputs = evaluator.inputs();

  let overlay = &inputs["rust-overlay"];
  assert_eq!(overlay.inputs["nixpkgs"], inputs["nixpkgs"]);
  assert_eq!(overlay.inputs["flake-utils"], inputs["flake-utils"]);

  let lock = evaluator.lock_file().unwrap();
  assert!(lock.get("rust-overlay/nixpkgs").is_none());
  assert!(lock.get("rust-overlay/flake-utils").is_none());
}

#[test]
fn rcalc_target_is_empty() {
  let temp = TempDir::new().unwrap();
  let descriptor = write_rcalc(temp.path(), TOOLS);
  let evaluator = evaluate(&temp, &descriptor).unwrap();

  let targets = evaluator.targets().unwrap();
  assert_eq!(targets.get("rcalc"), Some(&Target::Empty));

  let store = temp.path().join("store");
  let artifact = evaluator.build_target(Some("rcalc"), &store).unwrap();
  assert_eq!(artifact.name, "rcalc");
  assert!(artifact.out.is_none());
  assert!(artifact.files.is_empty());
  assert!(artifact.log.is_empty());
  assert!(!store.exists());
}

#[test]
fn shell_exposes_exactly_three_tools() {
  let temp = TempDir::new().unwrap();
  let descriptor = write_rcalc(temp.path(), TOOLS);
  let evaluator = evaluate(&temp, &descriptor).unwrap();

  let shell = evaluator.dev_shell().unwrap();

  assert_eq!(
    shell.tool_names(),
    vec!["rust-bin.nightly.latest.default", "cargo-watch", "cargo-bloat"]
  );
  let nightly = &shell.tools[0];
  assert_eq!(nightly.version.as_deref(), Some("1.85.0-nightly"));
  assert!(nightly.bin.ends_with("rust-overlay/toolchains/nightly/bin"));
  assert!(shell.tools[1].bin.ends_with("nixpkgs/pkgs/cargo-watch/bin"));
  assert!(nightly.bin.join("rustc").is_file());
  assert!(shell.tools.iter().all(|tool| tool.bin.is_dir()));
}

#[test]
fn unknown_tool_is_unresolved() {
  let temp = TempDir::new().unwrap();
  let descriptor = write_rcalc(temp.path(), r#""cargo-watch", "cargo-nonexistent""#);
  let evaluator = evaluate(&temp, &descriptor).unwrap();

  let err = evaluator.dev_shell().unwrap_err();
  assert!(matches!(
    err,
    EvalError::Shell(ShellError::UnresolvedTool { ref name }) if name == "cargo-nonexistent"
  ));
}

#[test]
fn reevaluation_is_idempotent() {
  let temp = TempDir::new().unwrap();
  let descriptor = write_rcalc(temp.path(), TOOLS);

  let first = evaluate(&temp, &descriptor).unwrap();
  let lock_path = temp.path().join("rcalc").join(LOCK_FILENAME);
  let written = std::fs::read_to_string(&lock_path).unwrap();

  let second = evaluate(&temp, &descriptor).unwrap();

  assert_eq!(first.inputs(), second.inputs());
  assert!(!second.resolution().unwrap().lock_changed);
  assert_eq!(std::fs::read_to_string(&lock_path).unwrap(), written);
  assert_eq!(first.dev_shell().unwrap(), second.dev_shell().unwrap());
}

#[test]
fn every_default_system_has_a_shell() {
  let temp = TempDir::new().unwrap();
  let descriptor = write_rcalc(temp.path(), TOOLS);
  let evaluator = evaluate(&temp, &descriptor).unwrap();

  let by_system: mlua::Table = evaluator.outputs().get("dev_shell").unwrap();
  for system in envpin_lib::platform::DEFAULT_SYSTEMS {
    assert!(by_system.contains_key(*system).unwrap(), "missing {system}");
  }
}
