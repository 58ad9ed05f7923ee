//! Display-name and id lookups.

pub mod esi;

pub use esi::EsiResolver;

use crate::error::Result;
use crate::types::EntityKind;

pub const UNKNOWN_NAME: &str = "Unknown";
pub const UNKNOWN_SHIP: &str = "Unknown ship";

/// `Ok(None)` means the directory answered but knows no such entity;
/// `Err` means it could not be asked.
pub trait Resolver {
  fn resolve_name(&self, kind: EntityKind, id: u64) -> Result<Option<String>>;

  fn resolve_ship_name(&self, type_id: u64) -> Result<Option<String>>;

  /// Exact, case-insensitive name lookup.
  fn resolve_id(&self, kind: EntityKind, text: &str) -> Result<Option<u64>>;
}

impl<R: Resolver + ?Sized> Resolver for std::sync::Arc<R> {
  fn resolve_name(&self, kind: EntityKind, id: u64) -> Result<Option<String>> {
    (**self).resolve_name(kind, id)
  }

  fn resolve_ship_name(&self, type_id: u64) -> Result<Option<String>> {
    (**self).resolve_ship_name(type_id)
  }

  fn resolve_id(&self, kind: EntityKind, text: &str) -> Result<Option<u64>> {
    (**self).resolve_id(kind, text)
  }
}

/// Name for display; failures are logged and rendered as [`UNKNOWN_NAME`].
pub fn display_name(resolver: &dyn Resolver, kind: EntityKind, id: u64) -> String {
  match resolver.resolve_name(kind, id) {
    Ok(Some(name)) => name,
    Ok(None) => UNKNOWN_NAME.to_string(),
    Err(e) => {
      tracing::warn!(kind = kind.label(), id, error = %e, "name lookup failed");
      UNKNOWN_NAME.to_string()
    }
  }
}

pub fn display_ship_name(resolver: &dyn Resolver, type_id: u64) -> String {
  match resolver.resolve_ship_name(type_id) {
    Ok(Some(name)) => name,
    Ok(None) => UNKNOWN_SHIP.to_string(),
    Err(e) => {
      tracing::warn!(type_id, error = %e, "ship name lookup failed");
      UNKNOWN_SHIP.to_string()
    }
  }
}
