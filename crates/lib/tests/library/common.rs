//! Shared fixtures for library integration tests.
//!
//! Every input is a local `path:` input so the tests run offline.

use std::fs;
use std::path::{Path, PathBuf};

use envpin_lib::eval::{EvalError, EvalOptions, Evaluator};
use envpin_lib::inputs::resolve::ResolveOptions;
use envpin_lib::inputs::store::InputCache;
use tempfile::TempDir;

pub const SYSTEM: &str = "x86_64-linux";

/// Write `content` to `root/relative`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
  let path = root.join(relative);
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(&path, content).unwrap();
  path
}

/// Create an executable named `program` inside `root/relative_bin`.
pub fn write_tool(root: &Path, relative_bin: &str, program: &str) {
  let exe = write_file(root, &format!("{relative_bin}/{program}"), "#!/bin/sh\necho ok\n");
  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
  }
}

/// A package collection exposing `cargo-watch` and `cargo-bloat`.
pub fn write_nixpkgs(root: &Path) {
  write_tool(root, "nixpkgs/pkgs/cargo-watch/bin", "cargo-watch");
  write_tool(root, "nixpkgs/pkgs/cargo-bloat/bin", "cargo-bloat");
  write_file(
    root,
    "nixpkgs/envpin.lua",
    r#"
return {
  outputs = function(inputs)
    return {
      package_set = function(ctx)
        return {
          ["cargo-watch"] = envpin.package{ version = "8.5.3", bin = "pkgs/cargo-watch/bin" },
          ["cargo-bloat"] = envpin.package{ version = "0.12.1", bin = "pkgs/cargo-bloat/bin" },
        }
      end,
    }
  end,
}
"#,
  );
}

/// Per-system helpers with no packages of their own.
pub fn write_flake_utils(root: &Path) {
  write_file(
    root,
    "flake-utils/envpin.lua",
    r#"return { outputs = function(inputs) return { lib = { systems = envpin.default_systems } } end }"#,
  );
}

/// An overlay adding `rust-bin.nightly.latest.default`.
///
/// Its own `nixpkgs` and `flake-utils` inputs point at directories that do not
/// exist, so only a `follows` for each lets resolution succeed.
pub fn write_rust_overlay(root: &Path) {
  write_tool(root, "rust-overlay/toolchains/nightly/bin", "rustc");
  write_file(
    root,
    "rust-overlay/envpin.lua",
    r#"
return {
  inputs = {
    nixpkgs = "path:./upstream-nixpkgs",
    ["flake-utils"] = "path:./upstream-flake-utils",
  },
  outputs = function(inputs)
    return {
      nixpkgs = inputs.nixpkgs,
      ["flake-utils"] = inputs["flake-utils"],
      overlays = {
        default = function(prev, ctx)
          return {
            ["rust-bin"] = {
              nightly = {
                latest = {
                  default = envpin.package{ version = "1.85.0-nightly", bin = "toolchains/nightly/bin" },
                },
              },
            },
          }
        end,
      },
    }
  end,
}
"#,
  );
}

/// The `rcalc` project: three inputs, an empty `rcalc` target and a dev shell
/// over the overlaid package set with `build_inputs` as given.
pub fn write_rcalc(root: &Path, build_inputs: &str) -> PathBuf {
  write_nixpkgs(root);
  write_flake_utils(root);
  write_rust_overlay(root);
  write_file(
    root,
    "rcalc/envpin.lua",
    &format!(
      r#"
return {{
  description = "rcalc",
  inputs = {{
    nixpkgs = "path:../nixpkgs",
    ["flake-utils"] = "path:../flake-utils",
    ["rust-overlay"] = {{
      url = "path:../rust-overlay",
      inputs = {{
        nixpkgs = {{ follows = "nixpkgs" }},
        ["flake-utils"] = {{ follows = "flake-utils" }},
      }},
    }},
  }},
  outputs = function(inputs)
    return envpin.each_system(inputs["flake-utils"].lib.systems, function(system)
      return {{
        packages = {{ rcalc = envpin.empty() }},
        dev_shell = {{
          pkgs = inputs.nixpkgs,
          overlays = {{ inputs["rust-overlay"].overlays.default }},
          build_inputs = {{ {build_inputs} }},
        }},
      }}
    end)
  end,
}}
"#
    ),
  )
}

pub fn options(temp: &TempDir) -> EvalOptions {
  EvalOptions::default()
    .with_system(SYSTEM)
    .with_resolve(ResolveOptions::default().with_cache(cache(temp)))
}

pub fn cache(temp: &TempDir) -> InputCache {
  InputCache::at(&temp.path().join("cache"))
}

pub fn evaluate(temp: &TempDir, descriptor: &Path) -> Result<Evaluator, EvalError> {
  Evaluator::load(descriptor, &options(temp))
}
