//! Test fixtures for envpin-lib unit tests.
//!
//! Builds small on-disk input trees (descriptors plus fake tool directories)
//! so resolution and evaluation can be exercised without network access.

use std::fs;
use std::path::{Path, PathBuf};

/// Write `content` to `root/relative`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, content: &str) -> PathBuf {
  let path = root.join(relative);
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(&path, content).unwrap();
  path
}

/// Create an executable stub named `program` inside `root/relative_bin`.
///
/// Returns the bin directory.
pub fn write_tool(root: &Path, relative_bin: &str, program: &str) -> PathBuf {
  let bin = root.join(relative_bin);
  fs::create_dir_all(&bin).unwrap();
  let exe = bin.join(program);
  fs::write(&exe, "#!/bin/sh\necho stub\n").unwrap();
  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();
  }
  bin
}
