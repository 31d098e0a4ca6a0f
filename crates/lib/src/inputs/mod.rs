//! Input resolution and management.
//!
//! This module resolves the external inputs (git repositories, local paths and
//! archives) declared in a descriptor's `inputs` table, including the inputs
//! those inputs declare themselves.
//!
//! # Modules
//!
//! - [`source`] - URL parsing for input sources
//! - [`lock`] - Lock file management for reproducible evaluation
//! - [`fetch`] - Git, path and archive retrieval
//! - [`resolve`] - High-level resolution orchestration
//! - [`types`] - Core input types (declarations, overrides, resolved inputs)
//! - [`graph`] - Dependency graph building, `follows` resolution and ordering
//! - [`store`] - Content-addressed store naming for fetched inputs

pub mod fetch;
pub mod graph;
pub mod lock;
pub mod resolve;
pub mod source;
pub mod store;
mod types;

pub use types::*;
