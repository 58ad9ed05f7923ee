use crate::commands::Admin;
use crate::config::{self, Config};
use crate::resolve::Resolver;
use crate::store;
use std::io::{BufRead, Write};
use std::path::Path;
use std::thread::JoinHandle;

pub fn print_help() {
  println!("kmpost v{}", env!("CARGO_PKG_VERSION"));
  println!("Usage: kmpost [--dry-run] [--check-config] [--version] [--help]");
  println!("  --dry-run       log notifications instead of posting; never write settings");
  println!("  --check-config  validate config.toml and settings.json, then exit");
  println!();
  println!("While running, admin commands are read from stdin, one per line:");
  println!("  <channel id> !kmpost help");
  println!();
  println!("Files live in ${} (default: current directory).", crate::paths::HOME_ENV);
}

/// Prints every problem found; errors if there was at least one.
pub fn check_config(cfg: &Config, settings_path: &Path, dry_run: bool) -> anyhow::Result<()> {
  let mut problems = config::validate(cfg, dry_run);
  match store::read_document(settings_path) {
    Ok(Some(doc)) => {
      let enabled = doc.values().filter(|s| s.enabled).count();
      println!(
        "settings: {} channel(s), {enabled} enabled ({})",
        doc.len(),
        settings_path.display()
      );
    }
    Ok(None) => println!("settings: none yet ({})", settings_path.display()),
    Err(e) => problems.push(format!("{e:#}")),
  }

  if problems.is_empty() {
    println!("config: ok (queue id {})", cfg.feed.queue_id);
    return Ok(());
  }
  for p in &problems {
    println!("problem: {p}");
  }
  anyhow::bail!("{} configuration problem(s)", problems.len())
}

/// Reads `<channel id> !kmpost ...` lines from stdin until EOF.
pub fn spawn_admin_console<R>(admin: Admin<R>) -> anyhow::Result<JoinHandle<()>>
where
  R: Resolver + Send + 'static,
{
  let handle = std::thread::Builder::new()
    .name("admin-console".to_string())
    .spawn(move || {
      let stdin = std::io::stdin();
      let stdout = std::io::stdout();
      match serve(&admin, stdin.lock(), stdout.lock()) {
        Ok(n) => tracing::info!(commands = n, "admin console input closed"),
        Err(e) => tracing::warn!(error = %e, "admin console stopped"),
      }
    })?;
  Ok(handle)
}

fn serve<R: Resolver>(
  admin: &Admin<R>,
  input: impl BufRead,
  mut output: impl Write,
) -> std::io::Result<usize> {
  let mut handled = 0;
  for line in input.lines() {
    let line = line?;
    let line = line.trim();
    if line.is_empty() {
      continue;
    }
    let Some((channel, text)) = line.split_once(char::is_whitespace) else {
      writeln!(output, "expected: <channel id> !kmpost <command>")?;
      continue;
    };
    match admin.handle(channel, text) {
      Some(reply) => {
        handled += 1;
        writeln!(output, "[{channel}] {reply}")?;
      }
      None => writeln!(output, "expected: <channel id> !kmpost <command>")?,
    }
    output.flush()?;
  }
  Ok(handled)
}
