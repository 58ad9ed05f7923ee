use crate::error::{Error, Result};
use reqwest::blocking::{Client, Response};
use reqwest::redirect::Policy;
use reqwest::Url;
use std::io::Read;
use std::time::Duration;

pub fn user_agent() -> String {
  format!("kmpost/{}", env!("CARGO_PKG_VERSION"))
}

pub fn build_client(timeout: Duration) -> anyhow::Result<Client> {
  let client = Client::builder()
    .timeout(timeout)
    .connect_timeout(timeout.min(Duration::from_secs(10)))
    .redirect(Policy::limited(3))
    .user_agent(user_agent())
    .build()?;
  Ok(client)
}

pub fn parse_http_url(raw: &str) -> anyhow::Result<Url> {
  let url = Url::parse(raw).map_err(|e| anyhow::anyhow!("invalid URL {raw}: {e}"))?;
  if url.scheme() != "https" && url.scheme() != "http" {
    anyhow::bail!("URL must use http or https: {raw}");
  }
  if url.host_str().is_none() {
    anyhow::bail!("URL has no host: {raw}");
  }
  Ok(url)
}

/// Checks the status, then reads at most `max_bytes` of the body.
pub fn read_ok_body(response: Response, max_bytes: usize) -> Result<Vec<u8>> {
  let status = response.status();
  let label = safe_url_label(response.url());
  if !status.is_success() {
    return Err(Error::UpstreamUnavailable(format!(
      "unexpected HTTP status {} for {label}",
      status.as_u16()
    )));
  }
  read_response_with_limit(response, max_bytes, &label)
}

fn read_response_with_limit(response: Response, max_bytes: usize, label: &str) -> Result<Vec<u8>> {
  let mut out = Vec::new();
  let mut limited = response.take((max_bytes.saturating_add(1)) as u64);
  limited
    .read_to_end(&mut out)
    .map_err(|e| Error::upstream(&format!("read body from {label}"), e))?;

  if out.len() > max_bytes {
    return Err(Error::UpstreamUnavailable(format!(
      "response from {label} exceeds max size {max_bytes} bytes"
    )));
  }

  Ok(out)
}

/// Host and path only; query strings may carry queue ids or tokens.
pub fn safe_url_label(url: &Url) -> String {
  let host = url.host_str().unwrap_or("<no-host>");
  let mut path = url.path().to_string();
  if path.is_empty() {
    path = "/".to_string();
  }
  format!("{host}{path}")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_label_drops_query() {
    let url = Url::parse("https://zkillredisq.stream/listen.php?queueID=secret&ttw=10").unwrap();
    assert_eq!(safe_url_label(&url), "zkillredisq.stream/listen.php");
  }

  #[test]
  fn only_http_urls_are_accepted() {
    assert!(parse_http_url("https://esi.evetech.net/latest").is_ok());
    assert!(parse_http_url("http://localhost:8080/listen.php").is_ok());
    assert!(parse_http_url("ftp://example.com").is_err());
    assert!(parse_http_url("not a url").is_err());
  }
}
