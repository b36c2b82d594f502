use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("redis error: {0}")]
  Redis(#[from] redis::RedisError),

  #[error("ttl must be greater than zero")]
  ZeroTtl,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
