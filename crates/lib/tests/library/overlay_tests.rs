//! Package sets, overlays and shells built directly from Rust.

use envpin_lib::pkgs::overlay::{Overlay, OverlayError, StaticOverlay, apply_overlays};
use envpin_lib::pkgs::{AttrKind, Package, PackageSet};
use envpin_lib::shell::{ShellError, build_shell};

fn base() -> PackageSet {
  let mut set = PackageSet::new();
  set.insert("cargo-watch", Package::new("/pkgs/cargo-watch/bin").with_version("8.5.3"));
  set.insert("cargo-bloat", Package::new("/pkgs/cargo-bloat/bin"));
  set.insert("python3.pip", Package::new("/pkgs/pip/bin"));
  set
}

fn names(names: &[&str]) -> Vec<String> {
  names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn no_overlays_is_identity() {
  let base = base();
  assert_eq!(apply_overlays(&base, &[]).unwrap(), base);
}

#[test]
fn later_overlay_wins() {
  let mut first = PackageSet::new();
  first.insert("cargo-watch", Package::new("/first/bin").with_version("9.0.0"));
  let mut second = PackageSet::new();
  second.insert("cargo-watch", Package::new("/second/bin").with_version("9.1.0"));

  let overlays: Vec<Box<dyn Overlay>> = vec![
    Box::new(StaticOverlay::new("first", first)),
    Box::new(StaticOverlay::new("second", second)),
  ];
  let result = apply_overlays(&base(), &overlays).unwrap();

  assert_eq!(result.package("cargo-watch").unwrap().version.as_deref(), Some("9.1.0"));
  assert!(result.contains("cargo-bloat"));
}

#[test]
fn kind_change_conflicts() {
  let mut delta = PackageSet::new();
  delta.insert("cargo-watch.nightly", Package::new("/nightly/bin"));
  let overlays: Vec<Box<dyn Overlay>> = vec![Box::new(StaticOverlay::new("nightly", delta))];

  let err = apply_overlays(&base(), &overlays).unwrap_err();
  assert!(matches!(
    err,
    OverlayError::Conflict { ref attr, ref overlay, from: AttrKind::Package, to: AttrKind::Namespace }
      if attr == "cargo-watch" && overlay == "nightly"
  ));
}

#[test]
fn shell_exposes_exactly_requested_tools() {
  let shell = build_shell(&base(), &names(&["cargo-bloat", "python3.pip"])).unwrap();

  assert_eq!(shell.tool_names(), vec!["cargo-bloat", "python3.pip"]);
  assert!(shell.env.is_empty());
}

#[test]
fn shell_rejects_absent_tool() {
  let err = build_shell(&base(), &names(&["cargo-watch", "cargo-nonexistent"])).unwrap_err();
  assert!(matches!(err, ShellError::UnresolvedTool { ref name } if name == "cargo-nonexistent"));
}

#[test]
fn shell_rejects_namespace() {
  let err = build_shell(&base(), &names(&["python3"])).unwrap_err();
  assert!(matches!(err, ShellError::UnresolvedTool { ref name } if name == "python3"));
}
