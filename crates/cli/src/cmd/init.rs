//! Implementation of the `envpin init` command.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use envpin_lib::init::init;

use crate::output::symbols;

/// Write a template `envpin.lua` into `dir`.
///
/// # Errors
///
/// Returns an error if the descriptor already exists or cannot be written.
pub fn cmd_init(dir: &Path) -> Result<()> {
  let result = init(dir).context("Failed to initialize project")?;

  println!(
    "{} {}",
    symbols::SUCCESS.green(),
    "Initialized envpin project!".green().bold()
  );
  println!();
  println!("  {} Descriptor: {}", symbols::INFO.cyan(), result.descriptor.display());
  println!();
  println!("{}", "Next steps:".bold());
  println!(
    "  1. Edit {} to declare inputs and tools",
    result.descriptor.display().to_string().cyan()
  );
  println!("  2. Run: {}", "envpin shell".cyan());

  Ok(())
}
