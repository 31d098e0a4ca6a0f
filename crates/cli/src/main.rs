mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use envpin_lib::shell::Shell;

use crate::output::OutputFormat;

/// envpin - reproducible development environments from pinned inputs
#[derive(Parser)]
#[command(name = "envpin")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Increase log verbosity (-v info, -vv debug)
  #[arg(short, long, global = true, action = ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Enter the development shell
  Shell {
    /// Descriptor to evaluate (default: ./envpin.lua, then ./shell.lua)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// System to evaluate for (e.g. x86_64-linux)
    #[arg(long)]
    system: Option<String>,

    /// Run a command with `sh -c` instead of an interactive shell
    #[arg(short, long)]
    command: Option<String>,
  },

  /// Print a script that activates the development shell
  PrintEnv {
    #[arg(short, long)]
    file: Option<PathBuf>,

    #[arg(long)]
    system: Option<String>,

    /// Shell syntax to emit (detected from $SHELL if not given)
    #[arg(long)]
    shell: Option<Shell>,
  },

  /// Build a target
  Build {
    /// Target to build (default: `default`, or the only target)
    target: Option<String>,

    #[arg(short, long)]
    file: Option<PathBuf>,

    #[arg(long)]
    system: Option<String>,
  },

  /// Show inputs, targets and shell tools
  Show {
    #[arg(short, long)]
    file: Option<PathBuf>,

    #[arg(long)]
    system: Option<String>,

    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Re-resolve inputs and rewrite envpin.lock
  Update {
    /// Inputs to update (default: all)
    inputs: Vec<String>,

    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Show what would change without writing the lock file
    #[arg(long)]
    dry_run: bool,
  },

  /// Write a template envpin.lua
  Init {
    /// Project directory
    #[arg(default_value = ".")]
    dir: PathBuf,
  },

  /// Show the current system and envpin directories
  Info,
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  match cli.command {
    Commands::Shell { file, system, command } => {
      let code = cmd::cmd_shell(file.as_deref(), system.as_deref(), command.as_deref())?;
      std::process::exit(code);
    }
    Commands::PrintEnv { file, system, shell } => cmd::cmd_print_env(file.as_deref(), system.as_deref(), shell),
    Commands::Build { target, file, system } => cmd::cmd_build(target.as_deref(), file.as_deref(), system.as_deref()),
    Commands::Show { file, system, output } => cmd::cmd_show(file.as_deref(), system.as_deref(), output),
    Commands::Update { inputs, file, dry_run } => cmd::cmd_update(file.as_deref(), inputs, dry_run),
    Commands::Init { dir } => cmd::cmd_init(&dir),
    Commands::Info => cmd::cmd_info(),
  }
}

/// `RUST_LOG` wins; otherwise the level follows `-v`.
fn init_tracing(verbose: u8) {
  let default = match verbose {
    0 => "warn",
    1 => "info",
    _ => "debug",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}
