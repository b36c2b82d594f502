//! Error type for `vtlens-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A bounded-cache write needs a positive TTL so that
  /// `expires_at > cached_at`.
  #[error("cache ttl must be positive and representable, got {0:?}")]
  InvalidTtl(std::time::Duration),

  #[error("cache capacity must be at least 1")]
  InvalidCapacity,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
