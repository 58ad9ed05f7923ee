pub mod commands;
pub mod config;
pub mod console;
pub mod consumer;
pub mod dispatch;
pub mod error;
pub mod feed;
pub mod http;
pub mod logging;
pub mod matching;
pub mod normalize;
pub mod paths;
pub mod registry;
pub mod resolve;
pub mod runtime;
pub mod store;
pub mod transport;
pub mod types;

use anyhow::Context;
use std::sync::{mpsc, Arc};

pub fn run(args: &[String]) -> anyhow::Result<()> {
  let flags = runtime::parse_flags(args)?;
  if flags.version {
    println!("{}", env!("CARGO_PKG_VERSION"));
    return Ok(());
  }
  if flags.help {
    console::print_help();
    return Ok(());
  }

  let base = paths::base_dir()?;
  let config_path = paths::config_path(&base);
  let settings_path = paths::settings_path(&base);

  let cfg = if flags.dry_run || flags.check_config {
    config::load_or_default_readonly(&config_path)?
  } else {
    config::load_or_create_default(&config_path)?
  };

  if flags.check_config {
    return console::check_config(&cfg, &settings_path, flags.dry_run);
  }

  logging::init_file_and_stderr(&paths::logs_dir(&base), &cfg.logging)?;

  let problems = config::validate(&cfg, flags.dry_run);
  if !problems.is_empty() {
    for p in &problems {
      tracing::error!(problem = %p, "invalid configuration");
    }
    anyhow::bail!(
      "invalid configuration in {}: {}",
      config_path.display(),
      problems.join("; ")
    );
  }

  let registry = Arc::new(store::load(&settings_path));
  let resolver = Arc::new(resolve::EsiResolver::new(&cfg.esi)?);
  let source = feed::RedisqSource::new(&cfg.feed)?;
  let transport: Box<dyn transport::Transport + Send> = if flags.dry_run {
    Box::new(transport::LogTransport)
  } else {
    Box::new(transport::DiscordTransport::new(&cfg.discord).context("discord transport")?)
  };

  let admin = commands::Admin::new(
    Arc::clone(&registry),
    Arc::clone(&resolver),
    settings_path,
    flags.dry_run,
  );
  console::spawn_admin_console(admin).context("start admin console")?;

  let (stop_tx, stop_rx) = mpsc::channel::<()>();
  ctrlc::set_handler(move || {
    let _ = stop_tx.send(());
  })?;

  tracing::info!(
    dry_run = flags.dry_run,
    channels = registry.len(),
    enabled = registry.enabled_count(),
    "starting kmpost"
  );
  let mut consumer = consumer::Consumer::new(
    source,
    dispatch::Dispatcher::new(resolver, transport),
    registry,
    consumer::Pacing::from_config(&cfg.feed),
  );
  consumer.run(&stop_rx);
  tracing::info!("kmpost stopped");
  Ok(())
}
