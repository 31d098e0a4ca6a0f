//! Activation scripts for interactive shells.

use std::path::Path;
use std::str::FromStr;

/// Shells `print-env` can emit activation scripts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
  Bash,
  Zsh,
  Fish,
  PowerShell,
  Sh,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unsupported shell '{0}' (expected bash, zsh, fish, sh or powershell)")]
pub struct UnknownShell(pub String);

impl Shell {
  /// Detect the user's shell from `$SHELL`, falling back to the platform default.
  pub fn detect() -> Self {
    match std::env::var("SHELL") {
      Ok(program) if !program.is_empty() => Self::from_program(&program),
      _ => Self::platform_default(),
    }
  }

  /// Classify a shell executable path such as `/usr/bin/zsh`.
  pub fn from_program(program: &str) -> Self {
    let name = Path::new(program)
      .file_stem()
      .and_then(|n| n.to_str())
      .unwrap_or("")
      .to_lowercase();

    match name.as_str() {
      "zsh" => Shell::Zsh,
      "bash" => Shell::Bash,
      "fish" => Shell::Fish,
      "pwsh" | "powershell" => Shell::PowerShell,
      n if n.contains("zsh") => Shell::Zsh,
      n if n.contains("bash") => Shell::Bash,
      n if n.contains("fish") => Shell::Fish,
      _ => Shell::Sh,
    }
  }

  #[cfg(windows)]
  fn platform_default() -> Self {
    Shell::PowerShell
  }

  #[cfg(not(windows))]
  fn platform_default() -> Self {
    Shell::Sh
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Shell::Bash => "bash",
      Shell::Zsh => "zsh",
      Shell::Fish => "fish",
      Shell::PowerShell => "powershell",
      Shell::Sh => "sh",
    }
  }

  /// Statement setting an environment variable.
  pub fn export_var(&self, name: &str, value: &str) -> String {
    let value = self.quote(value);
    match self {
      Shell::Fish => format!("set -gx {name} {value}"),
      Shell::PowerShell => format!("$env:{name} = {value}"),
      Shell::Bash | Shell::Zsh | Shell::Sh => format!("export {name}={value}"),
    }
  }

  /// Statement prepending `value` to a PATH-like variable.
  pub fn prepend_path(&self, name: &str, value: &str) -> String {
    let value = self.quote(value);
    match self {
      Shell::Fish => format!("set -gx {name} {value} ${name}"),
      Shell::PowerShell => format!("$env:{name} = {value} + [IO.Path]::PathSeparator + $env:{name}"),
      Shell::Bash | Shell::Zsh | Shell::Sh => format!("export {name}={value}:\"${name}\""),
    }
  }

  pub fn comment(&self, text: &str) -> String {
    format!("# {text}")
  }

  pub fn header(&self) -> &'static str {
    match self {
      Shell::Bash => "#!/usr/bin/env bash",
      Shell::Zsh => "#!/usr/bin/env zsh",
      Shell::Fish => "# fish activation script",
      Shell::PowerShell => "# PowerShell activation script",
      Shell::Sh => "#!/bin/sh",
    }
  }

  /// Single-quote a literal so the shell performs no expansion inside it.
  fn quote(&self, value: &str) -> String {
    match self {
      Shell::Fish => format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'")),
      Shell::PowerShell => format!("'{}'", value.replace('\'', "''")),
      Shell::Bash | Shell::Zsh | Shell::Sh => format!("'{}'", value.replace('\'', "'\\''")),
    }
  }
}

impl FromStr for Shell {
  type Err = UnknownShell;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "bash" => Ok(Shell::Bash),
      "zsh" => Ok(Shell::Zsh),
      "fish" => Ok(Shell::Fish),
      "sh" => Ok(Shell::Sh),
      "powershell" | "pwsh" => Ok(Shell::PowerShell),
      other => Err(UnknownShell(other.to_string())),
    }
  }
}

impl std::fmt::Display for Shell {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
