//! In-memory collaborators shared by the orchestrator and router tests.

use std::{
  collections::HashMap,
  sync::atomic::{AtomicBool, AtomicUsize, Ordering},
  time::Duration,
};

use parking_lot::Mutex;
use serde_json::{Value, json};
use vtlens_cache::MemoryCache;
use vtlens_core::{
  Error, Result,
  cache::FastCache,
  envelope::RawReport,
  report::{
    AnalysisResult, CacheEntry, Category, Domain, DomainDetails, DomainView, IpAddress,
    IpDetails, IpView,
  },
  store::{ReportStore, ReportTx},
  subject::SubjectKind,
  upstream::Upstream,
};
use vtlens_store_sqlite::{SqliteStore, SqliteTx};

// ─── Upstream ────────────────────────────────────────────────────────────────

/// An upstream that answers from a table of canned bodies and counts calls.
/// Unscripted identifiers answer 404.
#[derive(Default)]
pub struct ScriptedUpstream {
  responses: Mutex<HashMap<(SubjectKind, String), Result<String, u16>>>,
  calls:     AtomicUsize,
}

impl ScriptedUpstream {
  pub fn respond(&self, kind: SubjectKind, id: &str, body: Value) {
    self.responses.lock().insert((kind, id.to_owned()), Ok(body.to_string()));
  }

  pub fn respond_raw(&self, kind: SubjectKind, id: &str, body: &str) {
    self.responses.lock().insert((kind, id.to_owned()), Ok(body.to_owned()));
  }

  pub fn fail(&self, kind: SubjectKind, id: &str, status: u16) {
    self.responses.lock().insert((kind, id.to_owned()), Err(status));
  }

  pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }
}

impl Upstream for ScriptedUpstream {
  async fn fetch(&self, kind: SubjectKind, id: &str) -> Result<RawReport> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let scripted = self.responses.lock().get(&(kind, id.to_owned())).cloned();
    match scripted {
      Some(Ok(body)) => RawReport::decode(kind, body.as_bytes()),
      Some(Err(status)) => Err(Error::UpstreamStatus { status }),
      None => Err(Error::UpstreamStatus { status: 404 }),
    }
  }
}

// ─── Fast cache ──────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("cache unavailable")]
pub struct Unavailable;

/// A fast cache whose every operation fails.
pub struct BrokenCache;

impl FastCache for BrokenCache {
  type Error = Unavailable;

  async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, Unavailable> { Err(Unavailable) }

  async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), Unavailable> {
    Err(Unavailable)
  }

  async fn delete(&self, _key: &str) -> Result<(), Unavailable> { Err(Unavailable) }
}

/// A working in-process cache whose writes stall for `delay` first.
pub struct SlowCache {
  inner: MemoryCache,
  delay: Duration,
}

impl SlowCache {
  pub fn new(delay: Duration) -> Self { Self { inner: MemoryCache::default(), delay } }
}

impl FastCache for SlowCache {
  type Error = vtlens_cache::Error;

  async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
    self.inner.get(key).await
  }

  async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), Self::Error> {
    tokio::time::sleep(self.delay).await;
    self.inner.set(key, value, ttl).await
  }

  async fn delete(&self, key: &str) -> Result<(), Self::Error> { self.inner.delete(key).await }
}

// ─── Store ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum FlakyError {
  #[error(transparent)]
  Store(#[from] vtlens_store_sqlite::Error),

  #[error("injected store failure")]
  Injected,
}

/// A [`SqliteStore`] whose individual operations can be switched to fail.
pub struct FlakyStore {
  inner:                SqliteStore,
  fail_ip_reads:        AtomicBool,
  fail_domain_analysis: AtomicBool,
}

impl FlakyStore {
  pub fn new(inner: SqliteStore) -> Self {
    Self {
      inner,
      fail_ip_reads: AtomicBool::new(false),
      fail_domain_analysis: AtomicBool::new(false),
    }
  }

  pub fn fail_ip_reads(&self) { self.fail_ip_reads.store(true, Ordering::SeqCst); }

  /// Transactions begun from now on fail `replace_domain_analysis`.
  pub fn fail_domain_analysis(&self) { self.fail_domain_analysis.store(true, Ordering::SeqCst); }
}

impl ReportStore for FlakyStore {
  type Error = FlakyError;
  type Tx = FlakyTx;

  async fn begin(&self) -> Result<FlakyTx, FlakyError> {
    Ok(FlakyTx {
      inner:                self.inner.begin().await?,
      fail_domain_analysis: self.fail_domain_analysis.load(Ordering::SeqCst),
    })
  }

  async fn get_domain(&self, id: &str) -> Result<Option<Domain>, FlakyError> {
    Ok(self.inner.get_domain(id).await?)
  }

  async fn get_ip(&self, id: &str) -> Result<Option<IpAddress>, FlakyError> {
    if self.fail_ip_reads.load(Ordering::SeqCst) {
      return Err(FlakyError::Injected);
    }
    Ok(self.inner.get_ip(id).await?)
  }

  async fn domain_view(&self, id: &str) -> Result<Option<DomainView>, FlakyError> {
    Ok(self.inner.domain_view(id).await?)
  }

  async fn ip_view(&self, id: &str) -> Result<Option<IpView>, FlakyError> {
    Ok(self.inner.ip_view(id).await?)
  }

  async fn cache_get(&self, id: &str) -> Result<Option<CacheEntry>, FlakyError> {
    Ok(self.inner.cache_get(id).await?)
  }

  async fn cache_len(&self) -> Result<usize, FlakyError> { Ok(self.inner.cache_len().await?) }
}

pub struct FlakyTx {
  inner:                SqliteTx,
  fail_domain_analysis: bool,
}

impl ReportTx for FlakyTx {
  type Error = FlakyError;

  async fn upsert_domain(&self, domain: &Domain) -> Result<Domain, FlakyError> {
    Ok(self.inner.upsert_domain(domain).await?)
  }

  async fn upsert_ip(&self, ip: &IpAddress) -> Result<IpAddress, FlakyError> {
    Ok(self.inner.upsert_ip(ip).await?)
  }

  async fn replace_domain_categories(
    &self,
    domain_id: &str,
    categories: &[Category],
  ) -> Result<(), FlakyError> {
    Ok(self.inner.replace_domain_categories(domain_id, categories).await?)
  }

  async fn replace_domain_analysis(
    &self,
    domain_id: &str,
    results: &[AnalysisResult],
  ) -> Result<(), FlakyError> {
    if self.fail_domain_analysis {
      return Err(FlakyError::Injected);
    }
    Ok(self.inner.replace_domain_analysis(domain_id, results).await?)
  }

  async fn replace_ip_tags(&self, ip_id: &str, tags: &[String]) -> Result<(), FlakyError> {
    Ok(self.inner.replace_ip_tags(ip_id, tags).await?)
  }

  async fn replace_ip_analysis(
    &self,
    ip_id: &str,
    results: &[AnalysisResult],
  ) -> Result<(), FlakyError> {
    Ok(self.inner.replace_ip_analysis(ip_id, results).await?)
  }

  async fn upsert_domain_details(&self, details: &DomainDetails) -> Result<(), FlakyError> {
    Ok(self.inner.upsert_domain_details(details).await?)
  }

  async fn upsert_ip_details(&self, details: &IpDetails) -> Result<(), FlakyError> {
    Ok(self.inner.upsert_ip_details(details).await?)
  }

  async fn cache_put(
    &self,
    id: &str,
    payload: &str,
    ttl: Duration,
  ) -> Result<CacheEntry, FlakyError> {
    Ok(self.inner.cache_put(id, payload, ttl).await?)
  }

  async fn commit(self) -> Result<(), FlakyError> { Ok(self.inner.commit().await?) }

  async fn rollback(self) -> Result<(), FlakyError> { Ok(self.inner.rollback().await?) }
}

// ─── Provider bodies ─────────────────────────────────────────────────────────

pub fn domain_body(id: &str, categories: Value, results: Value) -> Value {
  json!({
    "data": {
      "id": id,
      "type": "domain",
      "attributes": {
        "creation_date": 0,
        "expiration_date": 1_900_000_000,
        "last_analysis_date": 1_700_000_000,
        "reputation": 5,
        "registrar": "Example Registrar",
        "tld": "com",
        "whois": "Domain Name: EXAMPLE.COM",
        "categories": categories,
        "last_analysis_stats": { "harmless": 60, "malicious": 1 },
        "last_analysis_results": results,
        "last_dns_records": [{ "type": "A", "value": "93.184.216.34", "ttl": 300 }],
        "total_votes": { "harmless": 3, "malicious": 0 }
      }
    }
  })
}

pub fn ip_body(id: &str, tags: Value) -> Value {
  json!({
    "data": {
      "id": id,
      "type": "ip_address",
      "attributes": {
        "asn": 15169,
        "as_owner": "GOOGLE",
        "country": "US",
        "network": "8.8.8.0/24",
        "tags": tags,
        "last_analysis_results": {
          "EngineA": { "category": "harmless", "result": "clean", "method": "blacklist" }
        }
      }
    }
  })
}

pub fn engine(category: &str) -> Value {
  json!({ "category": category, "result": "clean", "method": "blacklist" })
}
