//! Terminal output shared by the envpin commands.
//!
//! Text goes to stdout with colours when the terminal supports them; warnings
//! go to stderr.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const ADD: &str = "+";
  pub const MODIFY: &str = "~";
  pub const REMOVE: &str = "-";
}

/// How a lock entry changed during `envpin update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
  Added,
  Updated,
  Removed,
}

impl Change {
  pub fn symbol(self) -> &'static str {
    match self {
      Change::Added => symbols::ADD,
      Change::Updated => symbols::MODIFY,
      Change::Removed => symbols::REMOVE,
    }
  }

  /// Verb shown before the input name; dry runs use the conditional form.
  pub fn label(self, dry_run: bool) -> &'static str {
    match (self, dry_run) {
      (Change::Added, false) => "Added",
      (Change::Added, true) => "Would add",
      (Change::Updated, false) => "Updated",
      (Change::Updated, true) => "Would update",
      (Change::Removed, false) => "Removed",
      (Change::Removed, true) => "Would remove",
    }
  }
}

/// First 12 characters of a revision: a commit hash or an archive digest.
pub fn short_rev(rev: &str) -> &str {
  match rev.char_indices().nth(12) {
    Some((end, _)) => &rev[..end],
    None => rev,
  }
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    format!("{}m {}s", secs / 60, secs % 60)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// A bulleted `name detail` line, indented by `depth` levels.
pub fn print_entry(depth: usize, name: &str, detail: &str) {
  println!(
    "{}{} {} {}",
    "  ".repeat(depth),
    symbols::INFO,
    name.if_supports_color(Stream::Stdout, |s| s.cyan()),
    detail.if_supports_color(Stream::Stdout, |s| s.dimmed())
  );
}

/// Placeholder line for an empty section.
pub fn print_none() {
  println!("  {}", "none".if_supports_color(Stream::Stdout, |s| s.dimmed()));
}

pub fn print_change(change: Change, dry_run: bool, name: &str, detail: &str) {
  let symbol = change.symbol();
  let symbol = match change {
    Change::Added => symbol.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
    Change::Updated => symbol.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
    Change::Removed => symbol.if_supports_color(Stream::Stdout, |s| s.red()).to_string(),
  };
  let name = name.if_supports_color(Stream::Stdout, |s| s.cyan());
  if detail.is_empty() {
    println!("  {} {}: {}", symbol, change.label(dry_run), name);
  } else {
    println!("  {} {}: {} {}", symbol, change.label(dry_run), name, detail);
  }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
