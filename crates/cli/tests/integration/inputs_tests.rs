//! Input resolution, the lock file and `envpin update`.
//!
//! Git and archive tests are marked `#[ignore]` because they require network
//! access. Run with: `cargo test -- --ignored`

use predicates::prelude::*;

use super::common::TestEnv;

fn lock_json(env: &TestEnv) -> serde_json::Value {
  let content = std::fs::read_to_string(env.project_dir().join("envpin.lock")).unwrap();
  serde_json::from_str(&content).unwrap()
}

#[test]
fn first_evaluation_writes_lock() {
  let env = TestEnv::with_project();

  env.envpin_cmd().arg("show").assert().success();

  let lock = lock_json(&env);
  assert_eq!(lock["version"], 1);
  assert_eq!(lock["nodes"]["root"]["inputs"]["pkgs"], "pkgs");
  assert_eq!(lock["nodes"]["pkgs"]["type"], "path");
  assert_eq!(lock["nodes"]["pkgs"]["rev"], "local");
}

#[test]
fn follows_are_locked_as_paths() {
  let env = TestEnv::empty();
  env.write_pkgs("pkgs");
  env.write_file(
    "overlay/envpin.lua",
    r#"
return {
  inputs = { pkgs = "path:./vendored-pkgs" },
  outputs = function(inputs)
    return {
      overlays = {
        default = function(prev, ctx)
          return { greet = envpin.package{ bin = "bin" } }
        end,
      },
    }
  end,
}
"#,
  );
  env.write_file(
    "project/envpin.lua",
    r#"
return {
  inputs = {
    pkgs = "path:../pkgs",
    overlay = { url = "path:../overlay", inputs = { pkgs = { follows = "pkgs" } } },
  },
  outputs = function(inputs)
    return {
      dev_shell = {
        [envpin.system] = {
          pkgs = inputs.pkgs,
          overlays = { inputs.overlay.overlays.default },
          build_inputs = { "hello", "greet" },
        },
      },
    }
  end,
}
"#,
  );

  env
    .envpin_cmd()
    .args(["print-env", "--shell", "sh"])
    .assert()
    .success()
    .stdout(predicate::str::contains("overlay/bin").and(predicate::str::contains("project/bin").not()));

  let lock = lock_json(&env);
  assert_eq!(lock["nodes"]["overlay"]["inputs"]["pkgs"], serde_json::json!(["pkgs"]));
  assert!(lock["nodes"].get("overlay/pkgs").is_none());
}

#[test]
fn dangling_follows_fails() {
  let env = TestEnv::empty();
  env.write_pkgs("pkgs");
  env.write_file(
    "project/envpin.lua",
    r#"
return {
  inputs = {
    pkgs = { url = "path:../pkgs", inputs = { utils = { follows = "flake-utils" } } },
  },
  outputs = function(inputs) return {} end,
}
"#,
  );

  env
    .envpin_cmd()
    .arg("show")
    .assert()
    .failure()
    .stderr(predicate::str::contains("flake-utils"));
}

#[test]
fn missing_path_input_fails() {
  let env = TestEnv::empty();
  env.write_file(
    "project/envpin.lua",
    r#"return { inputs = { pkgs = "path:../nowhere" }, outputs = function() return {} end }"#,
  );

  env
    .envpin_cmd()
    .arg("show")
    .assert()
    .failure()
    .stderr(predicate::str::contains("pkgs"));
}

#[test]
fn changed_url_requires_update() {
  let env = TestEnv::with_project();
  env.envpin_cmd().arg("show").assert().success();

  env.write_pkgs("pkgs-v2");
  let descriptor = env.project_dir().join("envpin.lua");
  let content = std::fs::read_to_string(&descriptor).unwrap();
  std::fs::write(&descriptor, content.replace("path:../pkgs", "path:../pkgs-v2")).unwrap();

  env
    .envpin_cmd()
    .arg("show")
    .assert()
    .failure()
    .stderr(predicate::str::contains("envpin update pkgs"));

  env
    .envpin_cmd()
    .args(["update", "pkgs"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Lock file updated"));

  env.envpin_cmd().arg("show").assert().success();
  assert_eq!(lock_json(&env)["nodes"]["pkgs"]["url"], "path:../pkgs-v2");
}

#[test]
fn update_dry_run_keeps_lock() {
  let env = TestEnv::with_project();
  env.envpin_cmd().arg("show").assert().success();
  let before = std::fs::read_to_string(env.project_dir().join("envpin.lock")).unwrap();

  env.write_file("pkgs/hello/README", "changed");
  env
    .envpin_cmd()
    .args(["update", "--dry-run"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Would update"));

  let after = std::fs::read_to_string(env.project_dir().join("envpin.lock")).unwrap();
  assert_eq!(before, after);
}

#[test]
fn update_unknown_input_fails() {
  let env = TestEnv::with_project();

  env
    .envpin_cmd()
    .args(["update", "nixpkgs"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("input 'nixpkgs' is not declared"));
}

#[test]
#[ignore] // Requires network access
fn git_input_is_pinned_to_commit() {
  let env = TestEnv::empty();
  env.write_file(
    "project/envpin.lua",
    r#"
return {
  inputs = { src = "git:https://github.com/octocat/Hello-World.git" },
  outputs = function(inputs) return {} end,
}
"#,
  );

  env.envpin_cmd().arg("show").assert().success();

  let rev = lock_json(&env)["nodes"]["src"]["rev"].as_str().unwrap().to_string();
  assert_eq!(rev.len(), 40);
}
