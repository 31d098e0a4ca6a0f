//! Implementation of the `envpin show` command.
//!
//! Lists the descriptor's inputs with their pinned revisions, its build
//! targets and the tools of its dev shell.

use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};

use envpin_lib::eval::{EvalError, Evaluator};
use envpin_lib::inputs::ResolvedInputs;
use envpin_lib::shell::ShellEnvironment;
use envpin_lib::target::Target;

use super::evaluate;
use crate::output::{OutputFormat, print_entry, print_json, print_none, print_stat, short_rev, symbols};

pub fn cmd_show(file: Option<&Path>, system: Option<&str>, output: OutputFormat) -> Result<()> {
  let evaluator = evaluate(file, system)?;
  let targets = evaluator.targets().context("Failed to read targets")?;
  let shell = dev_shell(&evaluator)?;
  let inputs = evaluator.inputs();

  if output.is_json() {
    let json = serde_json::json!({
      "descriptor": evaluator.path(),
      "kind": evaluator.kind().to_string(),
      "system": evaluator.system(),
      "description": evaluator.description(),
      "inputs": inputs,
      "targets": targets,
      "shell": shell,
    });
    return print_json(&json);
  }

  println!(
    "{} ({})",
    evaluator.path().display().if_supports_color(Stream::Stdout, |s| s.bold()),
    evaluator.kind()
  );
  if let Some(description) = evaluator.description() {
    print_stat("Description", description);
  }
  print_stat("System", evaluator.system());

  println!();
  println!("Inputs:");
  if inputs.is_empty() {
    print_none();
  }
  print_inputs(&evaluator, &inputs, 1);

  println!();
  println!("Targets:");
  if targets.is_empty() {
    print_none();
  }
  for (name, target) in &targets {
    let detail = match target {
      Target::Empty => "empty".to_string(),
      Target::Bundle(bundle) => format!("bundle of {} tool(s)", bundle.tools.len()),
    };
    print_entry(1, name, &format!("({})", detail));
  }

  println!();
  println!("Shell:");
  match &shell {
    None => print_none(),
    Some(shell) => {
      for tool in &shell.tools {
        print_entry(1, &tool.name, tool.version.as_deref().unwrap_or(""));
      }
      for (name, value) in &shell.env {
        println!("  {} {}={}", symbols::ARROW, name, value);
      }
    }
  }

  Ok(())
}

/// The dev shell, or `None` when the descriptor defines none for this system.
fn dev_shell(evaluator: &Evaluator) -> Result<Option<ShellEnvironment>> {
  match evaluator.dev_shell() {
    Ok(shell) => Ok(Some(shell)),
    Err(EvalError::NoDevShell { .. }) => Ok(None),
    Err(e) => Err(e).context("Failed to build dev shell"),
  }
}

fn print_inputs(evaluator: &Evaluator, inputs: &ResolvedInputs, depth: usize) {
  let indent = "  ".repeat(depth);
  for (name, input) in inputs {
    let fetched = evaluator
      .lock_file()
      .and_then(|lock| lock.get(&input.node))
      .and_then(|node| node.last_modified)
      .map(|secs| humantime::format_rfc3339_seconds(UNIX_EPOCH + Duration::from_secs(secs)).to_string());

    // A name whose node lives elsewhere in the graph was reached through `follows`.
    let own_node = input.node == *name || input.node.ends_with(&format!("/{}", name));
    if depth > 1 && !own_node {
      println!(
        "{}{} {} {} {}",
        indent,
        symbols::ARROW,
        name.if_supports_color(Stream::Stdout, |s| s.cyan()),
        "follows".if_supports_color(Stream::Stdout, |s| s.dimmed()),
        input.node
      );
      continue;
    }

    print_entry(depth, name, &format!("{} {}", short_rev(&input.rev), input.url));
    if let Some(fetched) = fetched {
      println!(
        "{}  {}",
        indent,
        format!("last modified {}", fetched).if_supports_color(Stream::Stdout, |s| s.dimmed())
      );
    }
    print_inputs(evaluator, &input.inputs, depth + 1);
  }
}
