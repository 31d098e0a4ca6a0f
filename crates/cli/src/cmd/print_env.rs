//! Implementation of the `envpin print-env` command.

use std::path::Path;

use anyhow::{Context, Result};

use envpin_lib::shell::Shell;

use super::evaluate;

/// Print an activation script for `shell` (detected when `None`).
///
/// Usage: `eval "$(envpin print-env)"`.
pub fn cmd_print_env(file: Option<&Path>, system: Option<&str>, shell: Option<Shell>) -> Result<()> {
  let evaluator = evaluate(file, system)?;
  let env = evaluator
    .dev_shell()
    .with_context(|| format!("Failed to build dev shell for {}", evaluator.path().display()))?;

  let shell = shell.unwrap_or_else(Shell::detect);
  print!("{}", env.activation_script(shell));
  Ok(())
}
