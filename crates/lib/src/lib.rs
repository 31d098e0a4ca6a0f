//! envpin-lib: Core types and logic for envpin
//!
//! This crate evaluates environment descriptors:
//! - `inputs`: pinned upstream sources, `follows` resolution and the lock file
//! - `pkgs`: package sets and the overlays that extend them
//! - `shell`: the tool environment exposed to an interactive shell
//! - `target`: named build targets and the artifacts they produce
//! - `eval`: the evaluator tying a descriptor file to the operations above

pub mod consts;
pub mod eval;
pub mod init;
pub mod inputs;
pub mod lua;
pub mod pkgs;
pub mod platform;
pub mod shell;
pub mod target;
pub mod update;
pub mod util;
