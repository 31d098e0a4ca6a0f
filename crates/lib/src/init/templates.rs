//! Template content for `envpin init`.

/// Starter `envpin.lua`.
pub const DESCRIPTOR_TEMPLATE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/templates/envpin.lua"));
