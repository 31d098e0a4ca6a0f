use anyhow::Result;

use envpin_lib::platform::paths::{cache_dir, config_dir, store_dir};
use envpin_lib::platform::{platform_triple, resolve_system};

use crate::output::{print_stat, print_warning};

pub fn cmd_info() -> Result<()> {
  println!("envpin {}", env!("CARGO_PKG_VERSION"));
  println!();
  println!("System:");
  match platform_triple() {
    Some(triple) => print_stat("Platform", &triple),
    None => print_warning("Could not detect platform."),
  }
  match resolve_system(None) {
    Ok(system) => print_stat("Evaluating for", &system),
    Err(e) => print_warning(&format!("Invalid system override: {}", e)),
  }

  println!();
  println!("Directories:");
  print_stat("Config", &config_dir().display().to_string());
  print_stat("Cache", &cache_dir().display().to_string());
  print_stat("Store", &store_dir().display().to_string());

  Ok(())
}
