//! [`MemoryCache`]: an in-process fast cache for single-instance
//! deployments and tests.

use std::{
  sync::Arc,
  time::{Duration, Instant},
};

use moka::{Expiry, future::Cache};
use vtlens_core::cache::FastCache;

use crate::{Error, Result};

/// Entry count used unless configured otherwise.
pub const DEFAULT_MEMORY_CAPACITY: u64 = 10_000;

#[derive(Clone)]
struct Slot {
  value: Arc<[u8]>,
  ttl:   Duration,
}

/// Expires each entry after the TTL it was last written with.
struct SlotExpiry;

impl Expiry<String, Slot> for SlotExpiry {
  fn expire_after_create(&self, _key: &String, slot: &Slot, _now: Instant) -> Option<Duration> {
    Some(slot.ttl)
  }

  fn expire_after_update(
    &self,
    _key: &String,
    slot: &Slot,
    _now: Instant,
    _remaining: Option<Duration>,
  ) -> Option<Duration> {
    Some(slot.ttl)
  }
}

/// A capacity-bounded TTL cache. Expired and over-capacity entries are
/// evicted by moka's housekeeping, whether or not they are read again.
#[derive(Clone)]
pub struct MemoryCache {
  slots: Cache<String, Slot>,
}

impl Default for MemoryCache {
  fn default() -> Self { Self::new(DEFAULT_MEMORY_CAPACITY) }
}

impl MemoryCache {
  pub fn new(max_capacity: u64) -> Self {
    Self {
      slots: Cache::builder()
        .max_capacity(max_capacity)
        .expire_after(SlotExpiry)
        .build(),
    }
  }

  /// Approximate number of live entries; exact after
  /// [`run_pending_tasks`](Self::run_pending_tasks).
  pub fn entry_count(&self) -> u64 { self.slots.entry_count() }

  /// Apply pending evictions now instead of on the next housekeeping pass.
  pub async fn run_pending_tasks(&self) { self.slots.run_pending_tasks().await }
}

impl FastCache for MemoryCache {
  type Error = Error;

  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
    Ok(self.slots.get(key).await.map(|slot| slot.value.to_vec()))
  }

  async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
    if ttl.is_zero() {
      return Err(Error::ZeroTtl);
    }
    let slot = Slot { value: Arc::from(value), ttl };
    self.slots.insert(key.to_owned(), slot).await;
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<()> {
    self.slots.invalidate(key).await;
    Ok(())
  }
}
