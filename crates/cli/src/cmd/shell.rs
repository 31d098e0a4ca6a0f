//! Implementation of the `envpin shell` command.

use std::ffi::OsString;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::evaluate;

/// Spawn `$SHELL` (or `sh -c command`) inside the development shell.
///
/// Returns the child's exit code. Evaluation happens before the async runtime
/// starts, since fetching inputs uses blocking I/O.
pub fn cmd_shell(file: Option<&Path>, system: Option<&str>, command: Option<&str>) -> Result<i32> {
  let evaluator = evaluate(file, system)?;
  let env = evaluator
    .dev_shell()
    .with_context(|| format!("Failed to build dev shell for {}", evaluator.path().display()))?;

  info!(tools = ?env.tool_names(), "entering dev shell");

  let mut child = match command {
    Some(command) => {
      let mut child = env.command("sh")?;
      child.arg("-c").arg(command);
      child
    }
    None => env.command(interactive_shell())?,
  };

  let runtime = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let status = runtime
    .block_on(async { child.status().await })
    .context("Failed to spawn shell")?;

  // Killed by a signal: report a generic failure.
  Ok(status.code().unwrap_or(1))
}

fn interactive_shell() -> OsString {
  match std::env::var_os("SHELL") {
    Some(shell) if !shell.is_empty() => shell,
    _ if cfg!(windows) => OsString::from("powershell"),
    _ => OsString::from("sh"),
  }
}
