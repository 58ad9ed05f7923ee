use std::path::{Path, PathBuf};

pub const HOME_ENV: &str = "KMPOST_HOME";

pub fn base_dir() -> anyhow::Result<PathBuf> {
  match std::env::var_os(HOME_ENV) {
    Some(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
    _ => Ok(std::env::current_dir()?),
  }
}

pub fn config_path(base: &Path) -> PathBuf {
  base.join("config.toml")
}

pub fn logs_dir(base: &Path) -> PathBuf {
  base.join("logs")
}

pub fn settings_path(base: &Path) -> PathBuf {
  base.join("settings.json")
}
