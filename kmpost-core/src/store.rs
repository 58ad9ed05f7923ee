//! `settings.json` persistence for the subscription registry.

use crate::config::write_atomic;
use crate::registry::{Registry, RegistryDocument};
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

/// Best-effort startup load. A missing file yields an empty registry; an
/// unreadable or invalid one is moved to `settings.json.bad-{ts}` first.
pub fn load(path: &Path) -> Registry {
  let raw = match fs::read_to_string(path) {
    Ok(raw) => raw,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      tracing::info!(path = %path.display(), "no settings file; starting with no subscriptions");
      return Registry::new();
    }
    Err(e) => {
      tracing::warn!(path = %path.display(), error = %e, "settings file unreadable");
      quarantine(path);
      return Registry::new();
    }
  };

  match serde_json::from_str::<RegistryDocument>(&raw) {
    Ok(doc) => {
      let registry = Registry::from_document(doc);
      tracing::info!(
        channels = registry.len(),
        enabled = registry.enabled_count(),
        "settings loaded"
      );
      registry
    }
    Err(e) => {
      tracing::warn!(path = %path.display(), error = %e, "settings file invalid");
      quarantine(path);
      Registry::new()
    }
  }
}

/// Strict variant for `--check-config`.
pub fn read_document(path: &Path) -> anyhow::Result<Option<RegistryDocument>> {
  if !path.exists() {
    return Ok(None);
  }
  let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
  let doc = serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
  Ok(Some(doc))
}

pub fn save(path: &Path, registry: &Registry) -> anyhow::Result<()> {
  let doc = registry.to_document();
  let raw = serde_json::to_string_pretty(&doc).context("serialize settings")?;
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
  }
  write_atomic(path, &raw).with_context(|| format!("write {}", path.display()))?;
  tracing::info!(path = %path.display(), channels = doc.len(), "settings saved");
  Ok(())
}

fn quarantine(path: &Path) -> Option<PathBuf> {
  let ts = std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs();
  let name = path.file_name()?.to_string_lossy().into_owned();
  let backup = path.with_file_name(format!("{name}.bad-{ts}"));
  match fs::rename(path, &backup) {
    Ok(()) => {
      tracing::warn!(backup = %backup.display(), "invalid settings moved aside");
      Some(backup)
    }
    Err(e) => {
      tracing::warn!(path = %path.display(), error = %e, "could not move invalid settings aside");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::matching::{FilterRule, Target};

  #[test]
  fn missing_file_is_empty_registry() {
    let dir = tempfile::tempdir().unwrap();
    let reg = load(&dir.path().join("settings.json"));
    assert!(reg.is_empty());
    assert_eq!(reg.enabled_count(), 0);
  }

  #[test]
  fn save_then_load_restores_subscriptions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");

    let reg = Registry::new();
    reg.set_enabled("111", true);
    reg.init("222");
    reg
      .add_filter(
        "111",
        FilterRule {
          system: Target::id(30000142, "Jita"),
          ..FilterRule::any()
        },
      )
      .unwrap();
    save(&path, &reg).unwrap();

    let loaded = load(&path);
    assert_eq!(loaded.enabled_count(), 1);
    assert_eq!(loaded.to_document(), reg.to_document());

    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.contains("\"channelID\": \"111\""));
    assert!(raw.contains("\"systemID\": \"30000142\""));
  }

  #[test]
  fn reads_settings_written_by_older_bot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    fs::write(
      &path,
      r#"{"42":{"channelID":"42","enabled":true,"filters":[{"person":"-","corp":"Five","alliance":"-","system":"-","personID":"-","corpID":"5","allianceID":"-","systemID":"-"}]}}"#,
    )
    .unwrap();

    let reg = load(&path);
    assert_eq!(reg.enabled_count(), 1);
    let sub = reg.get("42").unwrap();
    assert_eq!(sub.filters[0].corp, Target::id(5, "Five"));
  }

  #[test]
  fn invalid_file_is_moved_aside() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    fs::write(&path, "{ not json").unwrap();

    let reg = load(&path);
    assert!(reg.is_empty());
    assert!(!path.exists());
    let moved = fs::read_dir(dir.path())
      .unwrap()
      .flatten()
      .any(|e| e.file_name().to_string_lossy().starts_with("settings.json.bad-"));
    assert!(moved);
  }

  #[test]
  fn strict_read_reports_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    assert!(read_document(&path).unwrap().is_none());
    fs::write(&path, "[]").unwrap();
    assert!(read_document(&path).is_err());
    assert!(path.exists());
  }
}
