//! Implementation of the `envpin build` command.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};

use envpin_lib::platform::paths::store_dir;

use super::evaluate;
use crate::output::{format_duration, print_stat, print_success, symbols};

/// Build `target`, or the default target when `None`.
pub fn cmd_build(target: Option<&str>, file: Option<&Path>, system: Option<&str>) -> Result<()> {
  let start = Instant::now();
  let evaluator = evaluate(file, system)?;

  let artifact = evaluator
    .build_target(target, &store_dir())
    .with_context(|| format!("Failed to build target from {}", evaluator.path().display()))?;

  print_success(&format!("Built {}", artifact.name));
  match &artifact.out {
    Some(out) => print_stat("Output", &out.display().to_string()),
    None => print_stat("Output", "none"),
  }
  print_stat("Files", &artifact.files.len().to_string());
  print_stat("Duration", &format_duration(start.elapsed()));

  for line in &artifact.log {
    println!(
      "  {} {}",
      symbols::INFO.if_supports_color(Stream::Stdout, |s| s.dimmed()),
      line
    );
  }

  Ok(())
}
