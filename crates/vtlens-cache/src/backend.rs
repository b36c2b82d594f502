use std::time::Duration;

use vtlens_core::cache::FastCache;

use crate::{Error, MemoryCache, RedisCache, Result};

/// The configured fast cache, dispatched by variant.
#[derive(Clone)]
pub enum FastCacheBackend {
  Redis(RedisCache),
  Memory(MemoryCache),
}

impl FastCacheBackend {
  /// Connect to Redis when a URL is configured, otherwise fall back to an
  /// in-process cache holding at most `memory_capacity` entries.
  pub async fn from_config(
    url: Option<&str>,
    password: Option<&str>,
    memory_capacity: u64,
  ) -> Result<Self> {
    match url {
      Some(url) => Ok(Self::Redis(RedisCache::connect(url, password).await?)),
      None => {
        tracing::info!(capacity = memory_capacity, "no redis url configured; using in-process fast cache");
        Ok(Self::Memory(MemoryCache::new(memory_capacity)))
      }
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::Redis(_) => "redis",
      Self::Memory(_) => "memory",
    }
  }
}

impl FastCache for FastCacheBackend {
  type Error = Error;

  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
    match self {
      Self::Redis(c) => c.get(key).await,
      Self::Memory(c) => c.get(key).await,
    }
  }

  async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
    match self {
      Self::Redis(c) => c.set(key, value, ttl).await,
      Self::Memory(c) => c.set(key, value, ttl).await,
    }
  }

  async fn delete(&self, key: &str) -> Result<()> {
    match self {
      Self::Redis(c) => c.delete(key).await,
      Self::Memory(c) => c.delete(key).await,
    }
  }
}
