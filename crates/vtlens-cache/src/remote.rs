//! [`RedisCache`]: the fast cache tier on a shared Redis instance.

use std::time::Duration;

use redis::{AsyncCommands as _, IntoConnectionInfo as _, aio::ConnectionManager};
use vtlens_core::cache::FastCache;

use crate::{Error, Result};

/// A Redis-backed fast cache.
///
/// The [`ConnectionManager`] reconnects on its own after a dropped
/// connection; cloning it per call is cheap and shares the one multiplexed
/// connection.
#[derive(Clone)]
pub struct RedisCache {
  conn: ConnectionManager,
}

impl RedisCache {
  /// Connect to `url`, overriding any password it carries with `password`.
  pub async fn connect(url: &str, password: Option<&str>) -> Result<Self> {
    let mut info = url.into_connection_info()?;
    if let Some(password) = password {
      info.redis.password = Some(password.to_owned());
    }

    let addr = info.addr.to_string();
    let client = redis::Client::open(info)?;
    let conn = ConnectionManager::new(client).await?;
    tracing::info!(%addr, "connected to redis fast cache");
    Ok(Self { conn })
  }
}

/// Whole seconds for `SETEX`, rounding sub-second remainders up.
fn ttl_secs(ttl: Duration) -> Result<u64> {
  if ttl.is_zero() {
    return Err(Error::ZeroTtl);
  }
  Ok(ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0))
}

impl FastCache for RedisCache {
  type Error = Error;

  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
    let mut conn = self.conn.clone();
    Ok(conn.get(key).await?)
  }

  async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
    let secs = ttl_secs(ttl)?;
    let mut conn = self.conn.clone();
    conn.set_ex::<_, _, ()>(key, value, secs).await?;
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<()> {
    let mut conn = self.conn.clone();
    conn.del::<_, ()>(key).await?;
    Ok(())
  }
}
