use crate::types::ChannelId;

/// Failures surfaced by the pipeline and the admin command path.
///
/// An empty feed poll is not an error; see [`crate::feed::Decoded::Empty`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("malformed payload: {0}")]
  MalformedPayload(String),

  #[error("upstream unavailable: {0}")]
  UpstreamUnavailable(String),

  #[error("invalid filter: {0}")]
  InvalidFilterSpec(String),

  #[error("channel id {0:?} is not a Discord snowflake")]
  InvalidChannelId(ChannelId),

  #[error("channel {0} is not initialized")]
  UnknownChannel(ChannelId),

  #[error("no filter at index {0}")]
  NoSuchFilter(usize),
}

impl Error {
  pub(crate) fn upstream(context: &str, e: impl std::fmt::Display) -> Self {
    Self::UpstreamUnavailable(format!("{context}: {e}"))
  }
}

pub type Result<T> = std::result::Result<T, Error>;
