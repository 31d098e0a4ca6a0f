use std::path::PathBuf;

use crate::consts::{APP_NAME, CACHE_DIR_ENV};

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var_os("USERPROFILE")
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("C:\\"))
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var_os("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("/"))
}

/// Returns the directory for configuration files for the application
#[cfg(windows)]
pub fn config_dir() -> PathBuf {
  std::env::var_os("APPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|| home_dir().join("AppData").join("Roaming"))
    .join(APP_NAME)
}

/// Returns the directory for configuration files for the application
#[cfg(not(windows))]
pub fn config_dir() -> PathBuf {
  let config_home = std::env::var("XDG_CONFIG_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".config"));
  config_home.join(APP_NAME)
}

/// Returns the directory for cache files for the application
///
/// `ENVPIN_CACHE_DIR` takes precedence over the platform default.
pub fn cache_dir() -> PathBuf {
  if let Some(dir) = std::env::var_os(CACHE_DIR_ENV) {
    return PathBuf::from(dir);
  }
  platform_cache_dir()
}

#[cfg(windows)]
fn platform_cache_dir() -> PathBuf {
  std::env::var_os("LOCALAPPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|| home_dir().join("AppData").join("Local"))
    .join(APP_NAME)
    .join("Cache")
}

#[cfg(not(windows))]
fn platform_cache_dir() -> PathBuf {
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".cache"));
  cache_home.join(APP_NAME)
}

/// Git clones used to fetch updates incrementally.
pub fn git_cache_dir() -> PathBuf {
  cache_dir().join("git")
}

/// Downloaded archives.
pub fn downloads_dir() -> PathBuf {
  cache_dir().join("downloads")
}

/// Content-addressed store of materialised inputs and built targets.
pub fn store_dir() -> PathBuf {
  cache_dir().join("store")
}
