//! `envpin shell` and `envpin print-env` against local projects.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
#[cfg(unix)]
fn shell_command_sees_tools() {
  let env = TestEnv::with_project();

  env
    .envpin_cmd()
    .args(["shell", "-c", "hello && echo \"$PROJECT:$ENVPIN_SHELL\""])
    .assert()
    .success()
    .stdout("hello\ndemo:1\n");
}

#[test]
#[cfg(unix)]
fn shell_forwards_exit_code() {
  let env = TestEnv::with_project();

  env.envpin_cmd().args(["shell", "-c", "exit 7"]).assert().code(7);
}

#[test]
#[cfg(unix)]
fn shell_only_exposes_requested_tools() {
  let env = TestEnv::with_project();

  env
    .envpin_cmd()
    .args(["shell", "-c", "command -v lint || echo missing"])
    .assert()
    .success()
    .stdout(predicate::str::contains("missing"));
}

#[test]
fn print_env_prepends_tool_dirs() {
  let env = TestEnv::with_project();

  env
    .envpin_cmd()
    .args(["print-env", "--shell", "fish"])
    .assert()
    .success()
    .stdout(predicate::str::contains("set -gx PATH"))
    .stdout(predicate::str::contains("hello"))
    .stdout(predicate::str::contains("set -gx PROJECT 'demo'"));
}

#[test]
fn explicit_file_outside_cwd() {
  let env = TestEnv::with_project();
  let descriptor = env.project_dir().join("envpin.lua");

  env
    .envpin_cmd_in(env.temp.path())
    .arg("print-env")
    .arg("-f")
    .arg(&descriptor)
    .args(["--shell", "sh"])
    .assert()
    .success()
    .stdout(predicate::str::contains("PROJECT='demo'"));
}

#[test]
#[cfg(unix)]
fn classic_descriptor_writes_no_lock() {
  let env = TestEnv::empty();
  env.write_pkgs("pkgs");
  env.write_file(
    "project/shell.lua",
    r#"
return {
  pkgs = "path:../pkgs",
  build_inputs = { "lint" },
  env = { MODE = "classic" },
}
"#,
  );

  env
    .envpin_cmd()
    .args(["shell", "-c", "lint && echo $MODE"])
    .assert()
    .success()
    .stdout("lint\nclassic\n");

  assert!(!env.project_dir().join("envpin.lock").exists());
}

#[test]
fn unknown_tool_fails() {
  let env = TestEnv::empty();
  env.write_pkgs("pkgs");
  env.write_file(
    "project/shell.lua",
    r#"return { pkgs = "path:../pkgs", build_inputs = { "cargo-nonexistent" } }"#,
  );

  env
    .envpin_cmd()
    .args(["print-env", "--shell", "sh"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("cargo-nonexistent"));
}
