//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the project, its path
/// inputs and the envpin cache.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn empty() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  /// A project in `project/` with a `pkgs` path input providing `hello`
  /// and `lint`, a dev shell and a bundle target.
  pub fn with_project() -> Self {
    let env = Self::empty();
    env.write_pkgs("pkgs");
    env.write_file(
      "project/envpin.lua",
      r#"
return {
  description = "demo project",
  inputs = { pkgs = "path:../pkgs" },
  outputs = function(inputs)
    return envpin.each_default_system(function(system)
      return {
        packages = {
          default = envpin.bundle{ pkgs = inputs.pkgs, paths = { "hello", "lint" } },
          docs = envpin.empty(),
        },
        dev_shell = {
          pkgs = inputs.pkgs,
          build_inputs = { "hello" },
          env = { PROJECT = "demo" },
        },
      }
    end)
  end,
}
"#,
    );
    env
  }

  /// A package input at `dir` exposing `hello` and `lint`.
  pub fn write_pkgs(&self, dir: &str) {
    self.write_tool(&format!("{dir}/hello/bin"), "hello");
    self.write_tool(&format!("{dir}/lint/bin"), "lint");
    self.write_file(
      &format!("{dir}/envpin.lua"),
      r#"
return {
  outputs = function(inputs)
    return {
      package_set = function(ctx)
        return {
          hello = envpin.package{ version = "2.12", bin = "hello/bin" },
          lint = envpin.package{ version = "0.3.0", bin = "lint/bin" },
        }
      end,
    }
  end,
}
"#,
    );
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// Write an executable `program` that prints its own name.
  pub fn write_tool(&self, relative_bin: &str, program: &str) {
    let path = format!("{relative_bin}/{program}");
    self.write_file(&path, &format!("#!/bin/sh\necho {program}\n"));
    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      let full = self.temp.path().join(&path);
      std::fs::set_permissions(&full, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.temp.path().join(relative)
  }

  pub fn project_dir(&self) -> PathBuf {
    self.path("project")
  }

  pub fn cache_path(&self) -> PathBuf {
    self.path("cache")
  }

  /// A Command for the envpin binary running in `project/`.
  ///
  /// `ENVPIN_CACHE_DIR` keeps fetched inputs and built targets inside the
  /// temp directory.
  pub fn envpin_cmd(&self) -> Command {
    self.envpin_cmd_in(&self.project_dir())
  }

  pub fn envpin_cmd_in(&self, dir: &Path) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("envpin");
    cmd.current_dir(dir);
    cmd.env("ENVPIN_CACHE_DIR", self.cache_path());
    cmd.env_remove("ENVPIN_SYSTEM");
    cmd.env_remove("RUST_LOG");
    cmd
  }
}
