mod build;
mod info;
mod init;
mod print_env;
mod shell;
mod show;
mod update;

use std::path::Path;

use anyhow::{Context, Result};

use envpin_lib::eval::{EvalOptions, Evaluator};
use envpin_lib::update::find_descriptor_path;

pub use build::cmd_build;
pub use info::cmd_info;
pub use init::cmd_init;
pub use print_env::cmd_print_env;
pub use shell::cmd_shell;
pub use show::cmd_show;
pub use update::cmd_update;

/// Locate and evaluate the descriptor for commands that need its outputs.
fn evaluate(file: Option<&Path>, system: Option<&str>) -> Result<Evaluator> {
  let cwd = std::env::current_dir().context("Failed to read current directory")?;
  let path = find_descriptor_path(file, &cwd).context("Failed to find descriptor")?;

  let mut options = EvalOptions::default();
  if let Some(system) = system {
    options = options.with_system(system);
  }

  Evaluator::load(&path, &options).with_context(|| format!("Failed to evaluate {}", path.display()))
}
