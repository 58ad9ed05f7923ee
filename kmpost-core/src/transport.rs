//! Outbound delivery of rendered notifications.

use crate::config::DiscordConfig;
use crate::error::{Error, Result};
use crate::http;
use anyhow::Context;
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use reqwest::Url;
use serde_json::json;
use std::time::Duration;

const MAX_REPLY_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emphasis {
  Plain,
  Highlighted,
}

impl Emphasis {
  pub fn color(self) -> u32 {
    match self {
      Emphasis::Plain => 0xff0000,
      Emphasis::Highlighted => 0x00ff00,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
  pub title: String,
  pub url: String,
  pub description: String,
  pub thumbnail_url: String,
  pub emphasis: Emphasis,
}

pub trait Transport {
  fn deliver(&self, channel: &str, notification: &Notification) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
  fn deliver(&self, channel: &str, notification: &Notification) -> Result<()> {
    (**self).deliver(channel, notification)
  }
}

/// Posts one embed per notification through the Discord REST API.
pub struct DiscordTransport {
  client: Client,
  api_base: String,
  auth: String,
}

impl DiscordTransport {
  pub fn new(cfg: &DiscordConfig) -> anyhow::Result<Self> {
    http::parse_http_url(&cfg.api_base).context("discord api_base")?;
    if cfg.token.trim().is_empty() {
      anyhow::bail!("discord token is empty");
    }
    let client = http::build_client(Duration::from_secs(cfg.timeout_seconds))
      .context("build Discord HTTP client")?;
    Ok(Self {
      client,
      api_base: cfg.api_base.trim_end_matches('/').to_string(),
      auth: format!("Bot {}", cfg.token.trim()),
    })
  }

  fn messages_url(&self, channel: &str) -> Result<Url> {
    if channel.is_empty() || !channel.bytes().all(|b| b.is_ascii_digit()) {
      return Err(Error::InvalidChannelId(channel.to_string()));
    }
    let raw = format!("{}/channels/{channel}/messages", self.api_base);
    Url::parse(&raw).map_err(|e| Error::upstream("build Discord URL", e))
  }
}

fn embed_body(n: &Notification) -> serde_json::Value {
  json!({
    "embeds": [{
      "title": n.title,
      "url": n.url,
      "description": n.description,
      "color": n.emphasis.color(),
      "thumbnail": { "url": n.thumbnail_url },
    }]
  })
}

impl Transport for DiscordTransport {
  fn deliver(&self, channel: &str, notification: &Notification) -> Result<()> {
    let url = self.messages_url(channel)?;
    let response = self
      .client
      .post(url.clone())
      .header(AUTHORIZATION, &self.auth)
      .json(&embed_body(notification))
      .send()
      .map_err(|e| Error::upstream(&format!("POST {}", http::safe_url_label(&url)), e))?;
    http::read_ok_body(response, MAX_REPLY_BYTES)?;
    Ok(())
  }
}

/// Logs what would have been sent. Used with `--dry-run`.
#[derive(Debug, Default)]
pub struct LogTransport;

impl Transport for LogTransport {
  fn deliver(&self, channel: &str, notification: &Notification) -> Result<()> {
    tracing::info!(
      channel = %channel,
      emphasis = ?notification.emphasis,
      title = %notification.title,
      description = %notification.description,
      "DRY-RUN: would deliver notification"
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn note(emphasis: Emphasis) -> Notification {
    Notification {
      title: "https://zkillboard.com/kill/1/".to_string(),
      url: "https://zkillboard.com/kill/1/".to_string(),
      description: "Pilot lost Rifter".to_string(),
      thumbnail_url: "https://images.evetech.net/types/587/render?size=64".to_string(),
      emphasis,
    }
  }

  #[test]
  fn embed_carries_emphasis_color() {
    let body = embed_body(&note(Emphasis::Highlighted));
    assert_eq!(body["embeds"][0]["color"], 0x00ff00);
    assert_eq!(
      body["embeds"][0]["thumbnail"]["url"],
      "https://images.evetech.net/types/587/render?size=64"
    );

    let body = embed_body(&note(Emphasis::Plain));
    assert_eq!(body["embeds"][0]["color"], 0xff0000);
  }

  #[test]
  fn discord_requires_token_and_numeric_channel() {
    assert!(DiscordTransport::new(&DiscordConfig::default()).is_err());

    let cfg = DiscordConfig {
      token: "abc".to_string(),
      ..DiscordConfig::default()
    };
    let discord = DiscordTransport::new(&cfg).unwrap();
    assert_eq!(
      discord.messages_url("123").unwrap().as_str(),
      "https://discord.com/api/v10/channels/123/messages"
    );
    assert!(matches!(
      discord.messages_url("../guilds"),
      Err(Error::InvalidChannelId(id)) if id == "../guilds"
    ));
    assert!(matches!(
      discord.deliver("", &note(Emphasis::Plain)),
      Err(Error::InvalidChannelId(_))
    ));
  }

  #[test]
  fn log_transport_always_succeeds() {
    assert!(LogTransport.deliver("1", &note(Emphasis::Plain)).is_ok());
  }
}
