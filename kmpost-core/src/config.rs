use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct Config {
  pub discord: DiscordConfig,
  pub feed: FeedConfig,
  pub esi: EsiConfig,
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
  #[serde(default)]
  pub token: String,

  #[serde(default = "default_discord_api_base")]
  pub api_base: String,

  #[serde(default = "default_http_timeout_seconds")]
  pub timeout_seconds: u64,
}

impl Default for DiscordConfig {
  fn default() -> Self {
    Self {
      token: String::new(),
      api_base: default_discord_api_base(),
      timeout_seconds: default_http_timeout_seconds(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
  #[serde(default = "default_feed_endpoint")]
  pub endpoint: String,

  /// RedisQ keys its per-client cursor on this value.
  #[serde(default)]
  pub queue_id: String,

  #[serde(default = "default_feed_timeout_seconds")]
  pub timeout_seconds: u64,

  #[serde(default = "default_ttw_seconds")]
  pub ttw_seconds: u64,

  #[serde(default = "default_idle_sleep_ms")]
  pub idle_sleep_ms: u64,

  #[serde(default = "default_error_backoff_ms")]
  pub error_backoff_ms: u64,
}

impl Default for FeedConfig {
  fn default() -> Self {
    Self {
      endpoint: default_feed_endpoint(),
      queue_id: String::new(),
      timeout_seconds: default_feed_timeout_seconds(),
      ttw_seconds: default_ttw_seconds(),
      idle_sleep_ms: default_idle_sleep_ms(),
      error_backoff_ms: default_error_backoff_ms(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsiConfig {
  #[serde(default = "default_esi_base_url")]
  pub base_url: String,

  #[serde(default = "default_http_timeout_seconds")]
  pub timeout_seconds: u64,
}

impl Default for EsiConfig {
  fn default() -> Self {
    Self {
      base_url: default_esi_base_url(),
      timeout_seconds: default_http_timeout_seconds(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
  #[serde(default = "default_log_level")]
  pub level: String,

  #[serde(default = "default_retention_days")]
  pub retention_days: u64,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      retention_days: default_retention_days(),
    }
  }
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_retention_days() -> u64 {
  14
}

fn default_discord_api_base() -> String {
  "https://discord.com/api/v10".to_string()
}

fn default_http_timeout_seconds() -> u64 {
  10
}

fn default_feed_endpoint() -> String {
  "https://zkillredisq.stream/listen.php".to_string()
}

fn default_feed_timeout_seconds() -> u64 {
  20
}

fn default_ttw_seconds() -> u64 {
  10
}

fn default_idle_sleep_ms() -> u64 {
  5000
}

fn default_error_backoff_ms() -> u64 {
  2000
}

fn default_esi_base_url() -> String {
  "https://esi.evetech.net/latest".to_string()
}

pub fn generate_queue_id() -> String {
  format!("kmpost-{}", uuid::Uuid::new_v4())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
  #[serde(default)]
  pub discord: Option<DiscordConfig>,

  #[serde(default)]
  pub feed: Option<FeedConfig>,

  #[serde(default)]
  pub esi: Option<EsiConfig>,

  #[serde(default)]
  pub logging: Option<LoggingConfig>,
}

impl ConfigFile {
  fn normalize(self) -> Config {
    let mut cfg = Config::default();
    if let Some(d) = self.discord {
      cfg.discord = d;
    }
    if let Some(f) = self.feed {
      cfg.feed = f;
    }
    if let Some(e) = self.esi {
      cfg.esi = e;
    }
    if let Some(l) = self.logging {
      cfg.logging = l;
    }
    cfg
  }

  fn needs_upgrade(&self) -> bool {
    self.discord.is_none()
      || self.esi.is_none()
      || self.logging.is_none()
      || self
        .feed
        .as_ref()
        .map(|f| f.queue_id.trim().is_empty())
        .unwrap_or(true)
  }
}

pub fn load_or_create_default(path: &Path) -> anyhow::Result<Config> {
  load_impl(path, true)
}

/// Never writes; a blank queue id is filled in memory only.
pub fn load_or_default_readonly(path: &Path) -> anyhow::Result<Config> {
  load_impl(path, false)
}

fn load_impl(path: &Path, allow_writes: bool) -> anyhow::Result<Config> {
  let parent = path
    .parent()
    .ok_or_else(|| anyhow::anyhow!("config path has no parent: {}", path.display()))?;
  if allow_writes {
    fs::create_dir_all(parent)?;
  }

  if !path.exists() {
    let mut cfg = Config::default();
    cfg.feed.queue_id = generate_queue_id();
    if allow_writes {
      write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?)?;
    } else {
      eprintln!(
        "kmpost: config missing at {}; using defaults in read-only mode (--dry-run).",
        path.display()
      );
    }
    return Ok(cfg);
  }

  let raw = fs::read_to_string(path)?;
  match toml::from_str::<ConfigFile>(&raw) {
    Ok(file) => {
      let upgrade = file.needs_upgrade();
      let mut cfg = file.normalize();
      if cfg.feed.queue_id.trim().is_empty() {
        cfg.feed.queue_id = generate_queue_id();
      }

      if allow_writes && upgrade {
        let backup = parent.join(format!("config.toml.bak-{}", unix_seconds()));
        match fs::copy(path, &backup) {
          Ok(_) => {
            write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?)?;
            eprintln!(
              "kmpost: upgraded config defaults written to {} (backup: {})",
              path.display(),
              backup.display()
            );
          }
          Err(e) => eprintln!(
            "kmpost: could not back up {} to {} ({e}); leaving it unchanged",
            path.display(),
            backup.display()
          ),
        }
      } else if upgrade {
        eprintln!(
          "kmpost: config at {} needs upgrade; proceeding without writing in --dry-run mode.",
          path.display()
        );
      }
      Ok(cfg)
    }
    Err(e) => {
      let mut cfg = Config::default();
      cfg.feed.queue_id = generate_queue_id();
      if allow_writes {
        let backup = parent.join(format!("config.toml.bad-{}", unix_seconds()));
        match fs::rename(path, &backup) {
          Ok(()) => {
            write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?)?;
            eprintln!(
              "kmpost: invalid config at {} (backed up to {}): {e}",
              path.display(),
              backup.display()
            );
          }
          Err(move_err) => eprintln!(
            "kmpost: invalid config at {} could not be moved aside ({move_err}); using defaults without rewriting it: {e}",
            path.display()
          ),
        }
      } else {
        eprintln!(
          "kmpost: invalid config at {}; using defaults in read-only mode (--dry-run): {e}",
          path.display()
        );
      }
      Ok(cfg)
    }
  }
}

/// Returns every problem found, in section order.
pub fn validate(cfg: &Config, dry_run: bool) -> Vec<String> {
  let mut problems = Vec::new();

  if cfg.feed.timeout_seconds == 0 {
    problems.push("feed.timeout_seconds must be > 0".to_string());
  }
  if cfg.feed.ttw_seconds >= cfg.feed.timeout_seconds {
    problems.push(format!(
      "feed.ttw_seconds ({}) must be lower than feed.timeout_seconds ({})",
      cfg.feed.ttw_seconds, cfg.feed.timeout_seconds
    ));
  }
  if let Err(e) = crate::http::parse_http_url(&cfg.feed.endpoint) {
    problems.push(format!("feed.endpoint: {e}"));
  }

  if cfg.esi.timeout_seconds == 0 {
    problems.push("esi.timeout_seconds must be > 0".to_string());
  }
  if let Err(e) = crate::http::parse_http_url(&cfg.esi.base_url) {
    problems.push(format!("esi.base_url: {e}"));
  }

  if cfg.discord.timeout_seconds == 0 {
    problems.push("discord.timeout_seconds must be > 0".to_string());
  }
  if let Err(e) = crate::http::parse_http_url(&cfg.discord.api_base) {
    problems.push(format!("discord.api_base: {e}"));
  }
  if cfg.discord.token.trim().is_empty() && !dry_run {
    problems.push("discord.token is empty (set it, or run with --dry-run)".to_string());
  }

  problems
}

fn to_config_file(cfg: &Config) -> ConfigFile {
  ConfigFile {
    discord: Some(cfg.discord.clone()),
    feed: Some(cfg.feed.clone()),
    esi: Some(cfg.esi.clone()),
    logging: Some(cfg.logging.clone()),
  }
}

fn unix_seconds() -> u64 {
  std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs()
}

pub(crate) fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
  let parent = path
    .parent()
    .ok_or_else(|| anyhow::anyhow!("file path has no parent: {}", path.display()))?;
  let tmp = parent.join(format!(
    ".{}.tmp",
    path.file_name().unwrap_or_default().to_string_lossy()
  ));

  fs::write(&tmp, contents)?;
  fs::rename(&tmp, path)?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn valid() -> Config {
    let mut cfg = Config::default();
    cfg.discord.token = "token".to_string();
    cfg
  }

  #[test]
  fn missing_file_is_created_with_queue_id() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let cfg = load_or_create_default(&path).unwrap();
    assert!(cfg.feed.queue_id.starts_with("kmpost-"));
    assert!(path.exists());

    // Second load keeps the persisted id.
    let again = load_or_create_default(&path).unwrap();
    assert_eq!(again.feed.queue_id, cfg.feed.queue_id);
  }

  #[test]
  fn partial_file_is_upgraded_with_backup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[feed]\nttw_seconds = 5\n").unwrap();

    let cfg = load_or_create_default(&path).unwrap();
    assert_eq!(cfg.feed.ttw_seconds, 5);
    assert_eq!(cfg.feed.timeout_seconds, 20);
    assert_eq!(cfg.esi.base_url, "https://esi.evetech.net/latest");

    let backups = fs::read_dir(dir.path())
      .unwrap()
      .flatten()
      .filter(|e| e.file_name().to_string_lossy().starts_with("config.toml.bak-"))
      .count();
    assert_eq!(backups, 1);

    let rewritten = fs::read_to_string(&path).unwrap();
    assert!(rewritten.contains("[discord]"));
    assert!(rewritten.contains(&cfg.feed.queue_id));
  }

  #[test]
  fn invalid_file_is_moved_aside() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "this is = = not toml").unwrap();

    let cfg = load_or_create_default(&path).unwrap();
    assert_eq!(cfg.feed.endpoint, default_feed_endpoint());
    let bad = fs::read_dir(dir.path())
      .unwrap()
      .flatten()
      .any(|e| e.file_name().to_string_lossy().starts_with("config.toml.bad-"));
    assert!(bad);
  }

  // Occupies every backup name the next few seconds could produce.
  fn block_backups(dir: &Path, suffix: &str) {
    let now = unix_seconds();
    for ts in now..now + 5 {
      let blocker = dir.join(format!("config.toml.{suffix}-{ts}"));
      fs::create_dir(&blocker).unwrap();
      fs::write(blocker.join("keep"), "").unwrap();
    }
  }

  #[test]
  fn upgrade_skipped_when_backup_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let original = "[feed]\nttw_seconds = 5\n";
    fs::write(&path, original).unwrap();
    block_backups(dir.path(), "bak");

    let cfg = load_or_create_default(&path).unwrap();
    assert_eq!(cfg.feed.ttw_seconds, 5);
    assert_eq!(fs::read_to_string(&path).unwrap(), original);
  }

  #[test]
  fn invalid_file_kept_when_it_cannot_be_moved() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let original = "this is = = not toml";
    fs::write(&path, original).unwrap();
    block_backups(dir.path(), "bad");

    let cfg = load_or_create_default(&path).unwrap();
    assert_eq!(cfg.feed.endpoint, default_feed_endpoint());
    assert_eq!(fs::read_to_string(&path).unwrap(), original);
  }

  #[test]
  fn readonly_load_never_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let cfg = load_or_default_readonly(&path).unwrap();
    assert!(!cfg.feed.queue_id.is_empty());
    assert!(!path.exists());
  }

  #[test]
  fn defaults_validate_with_token() {
    assert!(validate(&valid(), false).is_empty());
  }

  #[test]
  fn empty_token_only_allowed_in_dry_run() {
    let cfg = Config::default();
    assert_eq!(validate(&cfg, false).len(), 1);
    assert!(validate(&cfg, true).is_empty());
  }

  #[test]
  fn ttw_must_fit_inside_timeout() {
    let mut cfg = valid();
    cfg.feed.ttw_seconds = 20;
    let problems = validate(&cfg, false);
    assert_eq!(problems.len(), 1);
    assert!(problems[0].contains("ttw_seconds"));
  }

  #[test]
  fn bad_urls_and_zero_timeouts_are_reported() {
    let mut cfg = valid();
    cfg.esi.base_url = "ftp://esi".to_string();
    cfg.discord.timeout_seconds = 0;
    let problems = validate(&cfg, false);
    assert_eq!(problems.len(), 2);
  }
}
