use crate::config::FeedConfig;
use crate::error::{Error, Result};
use crate::feed::FeedSource;
use crate::http;
use anyhow::Context;
use reqwest::blocking::Client;
use reqwest::Url;
use std::time::Duration;

const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Long-polls the zKillboard RedisQ endpoint. Each call returns at most one
/// package; the server holds the request open for up to `ttw` seconds.
pub struct RedisqSource {
  client: Client,
  url: Url,
}

impl RedisqSource {
  pub fn new(cfg: &FeedConfig) -> anyhow::Result<Self> {
    let mut url = http::parse_http_url(&cfg.endpoint).context("feed endpoint")?;
    url
      .query_pairs_mut()
      .append_pair("queueID", &cfg.queue_id)
      .append_pair("ttw", &cfg.ttw_seconds.to_string());

    let client =
      http::build_client(Duration::from_secs(cfg.timeout_seconds)).context("build feed HTTP client")?;

    Ok(Self { client, url })
  }
}

impl FeedSource for RedisqSource {
  fn poll(&self) -> Result<String> {
    let response = self
      .client
      .get(self.url.clone())
      .send()
      .map_err(|e| Error::upstream(&format!("GET {}", http::safe_url_label(&self.url)), e))?;

    let body = http::read_ok_body(response, MAX_PAYLOAD_BYTES)?;
    String::from_utf8(body).map_err(|e| Error::MalformedPayload(format!("feed body is not UTF-8: {e}")))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_carries_queue_and_ttw() {
    let cfg = FeedConfig {
      queue_id: "kmpost-test".to_string(),
      ..FeedConfig::default()
    };
    let src = RedisqSource::new(&cfg).unwrap();
    let query: Vec<(String, String)> = src
      .url
      .query_pairs()
      .map(|(k, v)| (k.into_owned(), v.into_owned()))
      .collect();
    assert!(query.contains(&("queueID".to_string(), "kmpost-test".to_string())));
    assert!(query.contains(&("ttw".to_string(), cfg.ttw_seconds.to_string())));
  }
}
