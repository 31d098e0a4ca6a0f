//! `envpin build` and `envpin show`.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn build_default_bundle_links_tools() {
  let env = TestEnv::with_project();

  env
    .envpin_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Built default"))
    .stdout(predicate::str::contains("Files: 2"));

  let targets = env.cache_path().join("store").join("targets");
  let out = std::fs::read_dir(&targets)
    .unwrap()
    .map(|e| e.unwrap().path())
    .find(|p| p.file_name().unwrap().to_string_lossy().starts_with("default-"))
    .expect("bundle output");
  assert!(out.join("bin").join("hello").exists());
  assert!(out.join("bin").join("lint").exists());
}

#[test]
fn rebuild_reuses_output() {
  let env = TestEnv::with_project();
  env.envpin_cmd().arg("build").assert().success();

  env
    .envpin_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("reused"));
}

#[test]
fn build_empty_target() {
  let env = TestEnv::with_project();

  env
    .envpin_cmd()
    .args(["build", "docs"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Files: 0"));
}

#[test]
fn show_lists_inputs_targets_and_tools() {
  let env = TestEnv::with_project();

  env
    .envpin_cmd()
    .arg("show")
    .assert()
    .success()
    .stdout(predicate::str::contains("demo project"))
    .stdout(predicate::str::contains("pkgs"))
    .stdout(predicate::str::contains("docs"))
    .stdout(predicate::str::contains("bundle of 2 tool(s)"))
    .stdout(predicate::str::contains("hello"));
}

#[test]
fn show_json() {
  let env = TestEnv::with_project();

  let output = env.envpin_cmd().args(["show", "-o", "json"]).output().unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["kind"], "flake");
  assert_eq!(json["inputs"]["pkgs"]["type"], "path");
  assert_eq!(json["inputs"]["pkgs"]["rev"], "local");
  assert_eq!(json["targets"]["docs"]["kind"], "empty");
  assert_eq!(json["targets"]["default"]["kind"], "bundle");
  assert_eq!(json["shell"]["tools"][0]["name"], "hello");
  assert_eq!(json["shell"]["env"]["PROJECT"], "demo");
}
