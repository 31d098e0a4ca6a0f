//! Lua runtime for descriptors.
//!
//! - [`runtime`] - Lua state creation and `package.path` setup
//! - [`globals`] - The `envpin` global table and value markers
//! - [`loaders`] - `require`/`dofile` with per-file `__dir`
//! - [`descriptor`] - Descriptor loading and input declaration parsing
//! - [`convert`] - Package sets across the Lua boundary, Lua overlays

pub mod convert;
pub mod descriptor;
pub mod globals;
pub mod loaders;
pub mod runtime;
