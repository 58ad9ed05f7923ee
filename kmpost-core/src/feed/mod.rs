pub mod fetch;
pub mod schema;

pub use fetch::RedisqSource;
pub use schema::{decode, Decoded};

use crate::error::Result;

/// A pollable queue returning one raw payload per request.
///
/// Implementations must bound how long `poll` may block; the consumer only
/// observes shutdown between polls.
pub trait FeedSource {
  fn poll(&self) -> Result<String>;
}
