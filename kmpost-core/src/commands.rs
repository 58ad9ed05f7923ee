//! `!kmpost ...` administration commands.
//!
//! Every reply is wrapped in a code fence, ready to be posted back to the
//! channel the command came from.

use crate::error::{Error, Result};
use crate::matching::rules::WILDCARD;
use crate::matching::{FilterRule, Target};
use crate::registry::{Registry, Toggle};
use crate::resolve::Resolver;
use crate::store;
use crate::types::EntityKind;
use std::path::PathBuf;
use std::sync::Arc;

pub const PREFIX: &str = "!kmpost";

const MIN_NAME_CHARS: usize = 3;

const FILTER_USAGE: &str =
  "expected <person> <corporation> <alliance> <system>, with <-> for an ignored field";

const HELP: &str = "\
- '!kmpost init' - initialize killmail posting for this channel
- '!kmpost enable' - initialize and enable immediately
- '!kmpost disable' - disable posting for this channel
- '!kmpost status' - show whether posting is enabled
- '!kmpost filter list' - list filters for channel
- '!kmpost filter add <person> <corporation> <alliance> <system>' - add filter to channel
- '!kmpost filter rem <index>' - remove filter by index
- '!kmpost commit' - save all channel settings
- '!kmpost help' - print this message";

pub struct Admin<R> {
  registry: Arc<Registry>,
  resolver: R,
  settings_path: PathBuf,
  dry_run: bool,
}

impl<R: Resolver> Admin<R> {
  pub fn new(registry: Arc<Registry>, resolver: R, settings_path: PathBuf, dry_run: bool) -> Self {
    Self {
      registry,
      resolver,
      settings_path,
      dry_run,
    }
  }

  /// `None` when `text` is not addressed to this bot.
  pub fn handle(&self, channel: &str, text: &str) -> Option<String> {
    let text = text.trim();
    let rest = text.strip_prefix(PREFIX)?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
      return None;
    }

    let reply = self.dispatch(channel, rest.trim());
    tracing::info!(channel = %channel, command = %text, "admin command handled");
    Some(fence(&reply))
  }

  fn dispatch(&self, channel: &str, args: &str) -> String {
    let (command, rest) = split_word(args);
    match command {
      "" => "Expected at least two words! Type '!kmpost help'.".to_string(),
      "init" => {
        if self.registry.init(channel) {
          "Channel initialized!".to_string()
        } else {
          "Channel already initialized!".to_string()
        }
      }
      "enable" => match self.registry.set_enabled(channel, true) {
        Toggle::Changed => "Enabling posting on this channel!".to_string(),
        _ => "Posting already enabled!".to_string(),
      },
      "disable" => match self.registry.set_enabled(channel, false) {
        Toggle::Changed => "Disabling posting.".to_string(),
        Toggle::Unchanged | Toggle::Unknown => "Posting not enabled!".to_string(),
      },
      "status" => match self.registry.get(channel) {
        None => "No info for this channel!".to_string(),
        Some(sub) => format!(
          "Status: posting {}, {} filter(s).",
          if sub.enabled { "enabled" } else { "disabled" },
          sub.filters.len()
        ),
      },
      "filter" => self.filter(channel, rest),
      "commit" => self.commit(),
      "help" => HELP.to_string(),
      other => format!("Unknown command '{other}'. Type '!kmpost help'."),
    }
  }

  fn filter(&self, channel: &str, args: &str) -> String {
    let (sub, rest) = split_word(args);
    match sub {
      "list" => {
        let Some(subscription) = self.registry.get(channel) else {
          return "No info for this channel!".to_string();
        };
        if subscription.filters.is_empty() {
          return "No filters for this channel!".to_string();
        }
        let mut out = String::from("Filters for this channel:");
        for (i, rule) in subscription.filters.iter().enumerate() {
          out.push_str(&format!("\n{}: {}", i + 1, rule.describe()));
        }
        out
      }
      "add" => match self.add_filter(channel, rest) {
        Ok(index) => format!("Filter {index} created."),
        Err(Error::UnknownChannel(_)) => {
          "The channel is not configured, type '!kmpost init' to initialize!".to_string()
        }
        Err(e) => format!("Error! {e}"),
      },
      "rem" => {
        let Ok(index) = rest.trim().parse::<usize>() else {
          return "Error!\nCommand syntax: !kmpost filter rem <index>".to_string();
        };
        match self.registry.remove_filter(channel, index) {
          Ok(rule) => format!("Filter {index} removed: {}", rule.describe()),
          Err(Error::UnknownChannel(_)) => "No info for this channel!".to_string(),
          Err(e) => format!("Error!\n{e}"),
        }
      }
      _ => "Expected 'filter list', 'filter add ...' or 'filter rem <index>'.".to_string(),
    }
  }

  fn add_filter(&self, channel: &str, args: &str) -> Result<usize> {
    if self.registry.get(channel).is_none() {
      return Err(Error::UnknownChannel(channel.to_string()));
    }
    let fields = parse_filter_fields(args)?;
    let rule = build_rule(&self.resolver, &fields)?;
    let index = self.registry.add_filter(channel, rule)?;
    tracing::info!(channel = %channel, index, "filter added");
    Ok(index)
  }

  fn commit(&self) -> String {
    if self.dry_run {
      tracing::warn!(
        path = %self.settings_path.display(),
        channels = self.registry.len(),
        "DRY-RUN: would save settings"
      );
      return "DRY-RUN: configuration not saved.".to_string();
    }
    match store::save(&self.settings_path, &self.registry) {
      Ok(()) => "Configuration saved successfully.".to_string(),
      Err(e) => {
        tracing::error!(error = ?e, "saving settings failed");
        "Error while saving configuration!".to_string()
      }
    }
  }
}

/// Accepts `<a> <b c> <d> <e>` (names may contain spaces) or four
/// whitespace-separated words.
pub fn parse_filter_fields(args: &str) -> Result<[String; 4]> {
  let args = args.trim();
  let fields: Vec<String> = if args.contains('<') {
    let mut out = Vec::new();
    let mut rest = args;
    while let Some(open) = rest.find('<') {
      let after = &rest[open + 1..];
      let close = after
        .find('>')
        .ok_or_else(|| Error::InvalidFilterSpec(format!("unclosed '<' ({FILTER_USAGE})")))?;
      out.push(after[..close].trim().to_string());
      rest = &after[close + 1..];
    }
    out
  } else {
    args.split_whitespace().map(str::to_string).collect()
  };

  fields
    .try_into()
    .map_err(|_: Vec<String>| Error::InvalidFilterSpec(FILTER_USAGE.to_string()))
}

/// Resolves every named field before anything is stored; any miss rejects
/// the whole rule.
pub fn build_rule(resolver: &dyn Resolver, fields: &[String; 4]) -> Result<FilterRule> {
  let [person, corp, alliance, system] = fields;
  Ok(FilterRule {
    person: resolve_target(resolver, EntityKind::Character, person)?,
    corp: resolve_target(resolver, EntityKind::Corporation, corp)?,
    alliance: resolve_target(resolver, EntityKind::Alliance, alliance)?,
    system: resolve_target(resolver, EntityKind::SolarSystem, system)?,
  })
}

fn resolve_target(resolver: &dyn Resolver, kind: EntityKind, text: &str) -> Result<Target> {
  if text == WILDCARD {
    return Ok(Target::Any);
  }
  if text.chars().count() < MIN_NAME_CHARS {
    return Err(Error::InvalidFilterSpec(format!(
      "{} {text:?} is too short (at least {MIN_NAME_CHARS} characters)",
      kind.label()
    )));
  }
  match resolver.resolve_id(kind, text)? {
    Some(id) => Ok(Target::id(id, text)),
    None => Err(Error::InvalidFilterSpec(format!(
      "no {} named {text:?}",
      kind.label()
    ))),
  }
}

fn split_word(s: &str) -> (&str, &str) {
  let s = s.trim_start();
  match s.find(char::is_whitespace) {
    Some(i) => (&s[..i], s[i..].trim_start()),
    None => (s, ""),
  }
}

fn fence(text: &str) -> String {
  format!("```{text}```")
}
