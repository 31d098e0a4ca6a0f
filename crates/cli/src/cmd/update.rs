//! Implementation of the `envpin update` command.
//!
//! Re-resolves inputs, ignoring the pins of the named ones, and rewrites
//! `envpin.lock`.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use envpin_lib::inputs::lock::LOCK_FILENAME;
use envpin_lib::update::{UpdateOptions, find_descriptor_path, update_inputs};

use crate::output::{Change, format_duration, print_change, short_rev, symbols};

/// Execute the update command.
///
/// # Arguments
///
/// * `file` - Optional descriptor path. If not provided, uses descriptor discovery.
/// * `inputs` - Inputs to update. If empty, all inputs are updated.
/// * `dry_run` - If true, show what would change without writing the lock file.
///
/// # Errors
///
/// Returns an error if the descriptor cannot be found or input resolution fails.
pub fn cmd_update(file: Option<&Path>, inputs: Vec<String>, dry_run: bool) -> Result<()> {
  let start = Instant::now();
  let cwd = std::env::current_dir().context("Failed to read current directory")?;
  let path = find_descriptor_path(file, &cwd).context("Failed to find descriptor")?;

  let options = UpdateOptions {
    inputs,
    dry_run,
    ..Default::default()
  };
  let result = update_inputs(&path, &options).with_context(|| format!("Failed to update inputs of {}", path.display()))?;

  if dry_run {
    println!("{}", "Dry run - no changes written".yellow());
    println!();
  }

  for (name, (old_rev, new_rev)) in &result.updated {
    let detail = format!("{} {}", format!("{} ->", old_rev).dimmed(), new_rev.green());
    print_change(Change::Updated, dry_run, name, &detail);
  }

  for name in &result.added {
    let rev = result
      .lock_file
      .get(name)
      .and_then(|node| node.rev.as_deref())
      .unwrap_or("-");
    print_change(Change::Added, dry_run, name, &format!("({})", short_rev(rev)).dimmed().to_string());
  }

  for name in &result.removed {
    print_change(Change::Removed, dry_run, name, "");
  }

  if !result.unchanged.is_empty() {
    let names = result.unchanged.join(", ");
    println!("  {} Unchanged: {}", symbols::INFO.dimmed(), names.dimmed());
  }

  let has_changes = !result.updated.is_empty() || !result.added.is_empty() || !result.removed.is_empty();
  if !has_changes {
    println!("{} All inputs are up to date.", symbols::SUCCESS.green());
  } else if result.written {
    println!();
    println!(
      "{} Lock file updated: {}",
      symbols::SUCCESS.green(),
      path.parent().unwrap_or(Path::new(".")).join(LOCK_FILENAME).display()
    );
    println!(
      "  {} Duration: {}",
      symbols::INFO.dimmed(),
      format_duration(start.elapsed()).dimmed()
    );
  }

  Ok(())
}
