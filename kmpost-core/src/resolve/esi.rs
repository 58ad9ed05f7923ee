use super::Resolver;
use crate::config::EsiConfig;
use crate::error::{Error, Result};
use crate::http;
use crate::types::EntityKind;
use anyhow::Context;
use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;

const MAX_ESI_BYTES: usize = 256 * 1024;

/// EVE Swagger Interface lookups. No caching; every call is one request.
pub struct EsiResolver {
  client: Client,
  base: String,
}

#[derive(Debug, Deserialize)]
struct Named {
  name: String,
}

#[derive(Debug, Default, Deserialize)]
struct IdsResponse {
  #[serde(default)]
  characters: Vec<IdEntry>,
  #[serde(default)]
  corporations: Vec<IdEntry>,
  #[serde(default)]
  alliances: Vec<IdEntry>,
  #[serde(default)]
  systems: Vec<IdEntry>,
}

#[derive(Debug, Deserialize)]
struct IdEntry {
  id: u64,
  name: String,
}

impl EsiResolver {
  pub fn new(cfg: &EsiConfig) -> anyhow::Result<Self> {
    http::parse_http_url(&cfg.base_url).context("esi base_url")?;
    let client = http::build_client(Duration::from_secs(cfg.timeout_seconds))
      .context("build ESI HTTP client")?;
    Ok(Self {
      client,
      base: cfg.base_url.trim_end_matches('/').to_string(),
    })
  }

  fn url(&self, path: &str) -> Result<Url> {
    let raw = format!("{}/{}", self.base, path);
    Url::parse(&raw).map_err(|e| Error::upstream(&format!("build ESI URL {raw}"), e))
  }

  fn get_name(&self, path: &str) -> Result<Option<String>> {
    let url = self.url(path)?;
    let response = self
      .client
      .get(url.clone())
      .send()
      .map_err(|e| Error::upstream(&format!("GET {}", http::safe_url_label(&url)), e))?;

    let Some(body) = body_unless_not_found(response)? else {
      return Ok(None);
    };
    let named: Named = serde_json::from_slice(&body)
      .map_err(|e| Error::upstream(&format!("decode {}", http::safe_url_label(&url)), e))?;
    Ok(Some(named.name))
  }
}

// ESI answers 404 for ids it has never seen; that is a miss, not an outage.
fn body_unless_not_found(response: Response) -> Result<Option<Vec<u8>>> {
  if response.status() == StatusCode::NOT_FOUND {
    return Ok(None);
  }
  http::read_ok_body(response, MAX_ESI_BYTES).map(Some)
}

fn entity_path(kind: EntityKind, id: u64) -> String {
  match kind {
    EntityKind::Character => format!("characters/{id}/"),
    EntityKind::Corporation => format!("corporations/{id}/"),
    EntityKind::Alliance => format!("alliances/{id}/"),
    EntityKind::SolarSystem => format!("universe/systems/{id}/"),
  }
}

fn pick_id(resp: IdsResponse, kind: EntityKind, text: &str) -> Option<u64> {
  let entries = match kind {
    EntityKind::Character => resp.characters,
    EntityKind::Corporation => resp.corporations,
    EntityKind::Alliance => resp.alliances,
    EntityKind::SolarSystem => resp.systems,
  };
  entries
    .into_iter()
    .find(|e| e.name.eq_ignore_ascii_case(text))
    .map(|e| e.id)
}

impl Resolver for EsiResolver {
  fn resolve_name(&self, kind: EntityKind, id: u64) -> Result<Option<String>> {
    self.get_name(&entity_path(kind, id))
  }

  fn resolve_ship_name(&self, type_id: u64) -> Result<Option<String>> {
    self.get_name(&format!("universe/types/{type_id}/"))
  }

  fn resolve_id(&self, kind: EntityKind, text: &str) -> Result<Option<u64>> {
    let url = self.url("universe/ids/")?;
    let response = self
      .client
      .post(url.clone())
      .json(&[text])
      .send()
      .map_err(|e| Error::upstream(&format!("POST {}", http::safe_url_label(&url)), e))?;

    let Some(body) = body_unless_not_found(response)? else {
      return Ok(None);
    };
    // ESI returns `{}` when no category matched.
    let parsed: IdsResponse = serde_json::from_slice(&body)
      .map_err(|e| Error::upstream(&format!("decode {}", http::safe_url_label(&url)), e))?;
    Ok(pick_id(parsed, kind, text))
  }
}
