//! Platform detection and system triples.
//!
//! A system triple such as `x86_64-linux` selects which per-system outputs of a
//! descriptor are evaluated. The detected triple can be overridden with the
//! `ENVPIN_SYSTEM` environment variable or the CLI `--system` flag.

pub mod paths;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::consts::SYSTEM_ENV;

/// Systems enumerated by `envpin.each_default_system`.
pub const DEFAULT_SYSTEMS: &[&str] = &["aarch64-darwin", "aarch64-linux", "x86_64-darwin", "x86_64-linux"];

/// CPU architecture variants supported by envpin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
  X86_64,
  Aarch64,
}

impl Arch {
  /// Detect the current CPU architecture at runtime
  pub fn current() -> Option<Self> {
    std::env::consts::ARCH.parse().ok()
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86_64 => "x86_64",
      Self::Aarch64 => "aarch64",
    }
  }
}

impl FromStr for Arch {
  type Err = PlatformError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "x86_64" => Ok(Self::X86_64),
      "aarch64" => Ok(Self::Aarch64),
      other => Err(PlatformError::UnknownArch(other.to_string())),
    }
  }
}

/// Operating system variants supported by envpin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
  Linux,
  MacOs,
  Windows,
}

impl Os {
  /// Detect the current operating system at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::MacOs),
      "windows" => Some(Self::Windows),
      _ => None,
    }
  }

  /// Returns the identifier used in system triples (`darwin` for macOS)
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::MacOs => "darwin",
      Self::Windows => "windows",
    }
  }
}

impl FromStr for Os {
  type Err = PlatformError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "linux" => Ok(Self::Linux),
      "darwin" => Ok(Self::MacOs),
      "windows" => Ok(Self::Windows),
      other => Err(PlatformError::UnknownOs(other.to_string())),
    }
  }
}

/// Errors from parsing or detecting a system triple.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
  #[error("unknown architecture '{0}'")]
  UnknownArch(String),

  #[error("unknown operating system '{0}'")]
  UnknownOs(String),

  #[error("invalid system '{0}', expected '<arch>-<os>' (e.g. x86_64-linux)")]
  InvalidTriple(String),

  #[error("the current platform is not supported")]
  Unsupported,
}

/// Platform identifier combining architecture and OS (e.g., "aarch64-darwin")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
  pub arch: Arch,
  pub os: Os,
}

impl Platform {
  pub fn new(arch: Arch, os: Os) -> Self {
    Self { arch, os }
  }

  /// Detect the current platform at runtime
  ///
  /// Returns `None` if the OS or architecture is not supported
  pub fn current() -> Option<Self> {
    Some(Self {
      arch: Arch::current()?,
      os: Os::current()?,
    })
  }

  /// Returns the platform triple string (e.g., "aarch64-darwin")
  pub fn triple(&self) -> String {
    format!("{}-{}", self.arch.as_str(), self.os.as_str())
  }
}

impl FromStr for Platform {
  type Err = PlatformError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (arch, os) = s
      .split_once('-')
      .ok_or_else(|| PlatformError::InvalidTriple(s.to_string()))?;
    Ok(Self::new(arch.parse()?, os.parse()?))
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.triple())
  }
}

/// Returns the platform triple for the current system (e.g., "aarch64-darwin")
///
/// Returns `None` if the current platform is not supported
pub fn platform_triple() -> Option<String> {
  Platform::current().map(|p| p.triple())
}

/// Resolve the system to evaluate.
///
/// Priority: explicit value, then `ENVPIN_SYSTEM`, then the detected platform.
/// Explicit and environment values are validated as `<arch>-<os>` triples.
pub fn resolve_system(explicit: Option<&str>) -> Result<String, PlatformError> {
  if let Some(system) = explicit {
    return system.parse::<Platform>().map(|p| p.triple());
  }

  if let Ok(system) = std::env::var(SYSTEM_ENV)
    && !system.is_empty()
  {
    return system.parse::<Platform>().map(|p| p.triple());
  }

  platform_triple().ok_or(PlatformError::Unsupported)
}
