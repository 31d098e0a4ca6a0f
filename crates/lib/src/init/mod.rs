//! Scaffold a new envpin project.
//!
//! `envpin init` writes a starter `envpin.lua` declaring no inputs, a
//! `scripts` package, a bundle target and a dev shell.

mod templates;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::consts::DESCRIPTOR_FILENAME;

pub use templates::DESCRIPTOR_TEMPLATE;

/// Errors that can occur during initialization.
#[derive(Debug, Error)]
pub enum InitError {
  #[error("file already exists: {}", path.display())]
  PathExists { path: PathBuf },

  #[error("failed to create directory {}: {source}", path.display())]
  CreateDir { path: PathBuf, source: std::io::Error },

  #[error("failed to write file {}: {source}", path.display())]
  WriteFile { path: PathBuf, source: std::io::Error },

  #[error("failed to canonicalize path {}: {source}", path.display())]
  Canonicalize { path: PathBuf, source: std::io::Error },
}

/// Result of a successful initialization.
#[derive(Debug)]
pub struct InitResult {
  /// The project directory (canonicalized)
  pub dir: PathBuf,
  /// Path to the created descriptor
  pub descriptor: PathBuf,
}

/// Write a template `envpin.lua` into `dir`, creating `dir` if needed.
///
/// # Errors
///
/// Returns an error if:
/// - `envpin.lua` already exists
/// - Directory creation fails
/// - File writing fails
pub fn init(dir: &Path) -> Result<InitResult, InitError> {
  fs::create_dir_all(dir).map_err(|e| InitError::CreateDir {
    path: dir.to_path_buf(),
    source: e,
  })?;

  let dir = dunce::canonicalize(dir).map_err(|e| InitError::Canonicalize {
    path: dir.to_path_buf(),
    source: e,
  })?;

  let descriptor = dir.join(DESCRIPTOR_FILENAME);
  if descriptor.exists() {
    return Err(InitError::PathExists { path: descriptor });
  }

  fs::write(&descriptor, DESCRIPTOR_TEMPLATE).map_err(|e| InitError::WriteFile {
    path: descriptor.clone(),
    source: e,
  })?;
  info!(path = %descriptor.display(), "wrote descriptor");

  Ok(InitResult { dir, descriptor })
}
