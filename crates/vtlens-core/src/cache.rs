//! The fast cache tier: a TTL key-value store consulted before the durable
//! store. It is a best-effort shadow, so callers log its failures rather than
//! propagate them.

use std::{future::Future, time::Duration};

pub trait FastCache: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// `None` on a miss or after the store's own TTL expired the key.
  fn get<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send + 'a;

  fn set<'a>(
    &'a self,
    key: &'a str,
    value: &'a [u8],
    ttl: Duration,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn delete<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
