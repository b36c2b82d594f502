//! Error taxonomy for a report lookup.
//!
//! Every variant is terminal for the call that produced it; nothing in the
//! lookup path retries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unsupported report type: {0:?} (expected \"domain\" or \"ip\")")]
  UnsupportedKind(String),

  #[error("identifier must not be empty")]
  EmptyIdentifier,

  #[error("upstream request failed: {0}")]
  Fetch(String),

  #[error("upstream returned status {status}")]
  UpstreamStatus { status: u16 },

  #[error("malformed upstream payload: {0}")]
  Decode(String),

  #[error("persistence error: {0}")]
  Persistence(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Wrap a storage backend error.
  pub fn persistence<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Persistence(Box::new(err))
  }

  /// `true` for errors caused by the caller's input rather than the server.
  pub fn is_validation(&self) -> bool {
    matches!(self, Self::UnsupportedKind(_) | Self::EmptyIdentifier)
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
