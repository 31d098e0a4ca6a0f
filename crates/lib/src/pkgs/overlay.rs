//! Overlays: ordered transforms over a package set.
//!
//! An overlay receives the package set accumulated so far (`prev`) and returns
//! a delta. The delta is merged into `prev` at top-level attribute
//! granularity, like Nix's `prev // delta`: a top-level attribute in the delta
//! replaces the one in `prev` wholesale.

use thiserror::Error;
use tracing::{debug, trace};

use super::{AttrKind, PackageSet};

#[derive(Debug, Error)]
pub enum OverlayError {
  /// The overlay redefines a top-level attribute as the other kind
  /// (a package as a namespace or the reverse).
  #[error("overlay '{overlay}' redefines '{attr}' from a {from} to a {to}")]
  Conflict {
    attr: String,
    overlay: String,
    from: AttrKind,
    to: AttrKind,
  },

  /// The overlay did not return a package set.
  #[error("overlay '{overlay}' returned {found}, expected a table")]
  InvalidResult { overlay: String, found: String },

  /// The overlay raised an error.
  #[error("overlay '{overlay}' failed: {source}")]
  Lua {
    overlay: String,
    #[source]
    source: mlua::Error,
  },
}

/// A transform `prev -> delta` over a package set.
pub trait Overlay {
  /// Name used in errors and logs.
  fn name(&self) -> &str;

  /// Compute the attributes this overlay adds or replaces.
  fn apply(&self, prev: &PackageSet) -> Result<PackageSet, OverlayError>;
}

/// An overlay with a fixed delta, independent of `prev`.
#[derive(Debug, Clone)]
pub struct StaticOverlay {
  name: String,
  delta: PackageSet,
}

impl StaticOverlay {
  pub fn new(name: &str, delta: PackageSet) -> Self {
    Self {
      name: name.to_string(),
      delta,
    }
  }
}

impl Overlay for StaticOverlay {
  fn name(&self) -> &str {
    &self.name
  }

  fn apply(&self, _prev: &PackageSet) -> Result<PackageSet, OverlayError> {
    Ok(self.delta.clone())
  }
}

/// Apply overlays in order, starting from `base`.
///
/// `apply_overlays(base, &[])` returns a set equal to `base`.
pub fn apply_overlays(base: &PackageSet, overlays: &[Box<dyn Overlay>]) -> Result<PackageSet, OverlayError> {
  let mut current = base.clone();

  for overlay in overlays {
    let delta = overlay.apply(&current)?;
    debug!(overlay = overlay.name(), attrs = delta.attrs().len(), "applying overlay");
    current = merge(current, delta, overlay.name())?;
  }

  Ok(current)
}

/// Shallow merge of `delta` over `prev`.
fn merge(mut prev: PackageSet, delta: PackageSet, overlay: &str) -> Result<PackageSet, OverlayError> {
  for (name, attr) in delta.attrs {
    if let Some(existing) = prev.top_level(&name)
      && existing.kind() != attr.kind()
    {
      return Err(OverlayError::Conflict {
        attr: name,
        overlay: overlay.to_string(),
        from: existing.kind(),
        to: attr.kind(),
      });
    }
    trace!(attr = %name, overlay, "set attribute");
    prev.set_top_level(name, attr);
  }
  Ok(prev)
}
