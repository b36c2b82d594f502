//! The report orchestrator: fast cache, then (for IPs) the entity store, then
//! the upstream provider, with every refresh persisted in one transaction.

use std::{fmt::Display, future::Future, sync::Arc, time::Duration};

use chrono::Utc;
use vtlens_core::{
  Error, Result,
  cache::FastCache,
  envelope::RawReport,
  normalize::{normalize_domain, normalize_ip},
  report::{DomainRecord, IpAddress, IpRecord, Report},
  store::{ReportStore, ReportTx},
  subject::{SubjectKind, validate_identifier},
  upstream::Upstream,
};

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Tier lifetimes, the IP staleness window and the fast cache deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
  pub fast_cache_ttl:       Duration,
  /// Longest any one fast cache command may take before it is abandoned.
  /// Write-backs run inside the store transaction, so this also bounds how
  /// long a slow cache can hold the store.
  pub fast_cache_timeout:   Duration,
  pub persistent_cache_ttl: Duration,
  /// A stored IP row younger than this is served without asking upstream.
  pub ip_freshness:         Duration,
}

impl Default for Policy {
  fn default() -> Self {
    Self {
      fast_cache_ttl:       Duration::from_secs(60 * 60),
      fast_cache_timeout:   Duration::from_millis(500),
      persistent_cache_ttl: Duration::from_secs(60 * 60),
      ip_freshness:         Duration::from_secs(24 * 60 * 60),
    }
  }
}

// ─── Orchestrator ────────────────────────────────────────────────────────────

/// Coordinates the cache tiers, the entity store and the upstream provider.
///
/// The orchestrator is the only writer to the store. Its collaborators are
/// long-lived and shared, so cloning it is cheap.
pub struct Orchestrator<S, C, U> {
  store:    Arc<S>,
  cache:    Arc<C>,
  upstream: Arc<U>,
  policy:   Policy,
}

impl<S, C, U> Clone for Orchestrator<S, C, U> {
  fn clone(&self) -> Self {
    Self {
      store:    self.store.clone(),
      cache:    self.cache.clone(),
      upstream: self.upstream.clone(),
      policy:   self.policy,
    }
  }
}

impl<S, C, U> Orchestrator<S, C, U>
where
  S: ReportStore,
  C: FastCache,
  U: Upstream,
{
  pub fn new(store: Arc<S>, cache: Arc<C>, upstream: Arc<U>, policy: Policy) -> Self {
    Self { store, cache, upstream, policy }
  }

  pub fn store(&self) -> &S { &self.store }

  /// Return the report for `id`, fetching and persisting it if no tier can
  /// answer.
  pub async fn fetch_report(&self, id: &str, kind: SubjectKind) -> Result<Report> {
    let id = validate_identifier(id)?;
    let key = kind.cache_key(id);

    if let Some(report) = self.from_fast_cache(kind, &key).await {
      tracing::debug!(%kind, id, "fast cache hit");
      return Ok(report);
    }
    tracing::debug!(%kind, id, "fast cache miss");

    // Domains always go upstream on a fast-cache miss; only IPs consult the
    // store's freshness first.
    if kind == SubjectKind::Ip
      && let Some(ip) = self.fresh_ip(id).await
    {
      let report = Report::Ip(ip);
      match report.to_json() {
        Ok(payload) => self.write_back(&key, &payload).await,
        Err(e) => tracing::warn!(%kind, id, error = %e, "could not serialise stored report"),
      }
      tracing::info!(%kind, id, "served fresh report from store");
      return Ok(report);
    }

    let raw = match self.upstream.fetch(kind, id).await {
      Ok(raw) => raw,
      Err(e) => {
        tracing::error!(%kind, id, error = %e, "upstream fetch failed");
        return Err(e);
      }
    };

    let report = self.persist(id, &key, raw).await?;
    tracing::info!(%kind, id, "fetched and persisted report");
    Ok(report)
  }

  // ── Tier lookups ──────────────────────────────────────────────────────────

  /// A fast-cache hit, or `None` on a miss, a cache failure or an
  /// undecodable payload.
  async fn from_fast_cache(&self, kind: SubjectKind, key: &str) -> Option<Report> {
    let bytes = self.bounded("read", key, self.cache.get(key)).await??;

    match Report::from_json(kind, &bytes) {
      Ok(report) => Some(report),
      Err(e) => {
        tracing::warn!(key, error = %e, "undecodable fast cache payload; treating as miss");
        None
      }
    }
  }

  /// The stored IP row if it is fresh. A failed read counts as stale so the
  /// lookup falls through to upstream.
  async fn fresh_ip(&self, id: &str) -> Option<IpAddress> {
    let ip = match self.store.get_ip(id).await {
      Ok(ip) => ip?,
      Err(e) => {
        tracing::warn!(id, error = %e, "stored ip read failed; treating as stale");
        return None;
      }
    };

    // A row stamped in the future counts as brand new.
    let age = (Utc::now() - ip.updated_at).to_std().unwrap_or_default();
    if age < self.policy.ip_freshness {
      Some(ip)
    } else {
      tracing::debug!(id, age_secs = age.as_secs(), "stored ip report is stale");
      None
    }
  }

  // ── Fast cache commands ───────────────────────────────────────────────────

  /// Run one fast cache command under the policy deadline. Failures and
  /// timeouts are logged and yield `None`; the cache is never fatal.
  async fn bounded<T, E: Display>(
    &self,
    op: &'static str,
    key: &str,
    command: impl Future<Output = Result<T, E>>,
  ) -> Option<T> {
    match tokio::time::timeout(self.policy.fast_cache_timeout, command).await {
      Ok(Ok(value)) => Some(value),
      Ok(Err(e)) => {
        tracing::warn!(op, key, error = %e, "fast cache command failed");
        None
      }
      Err(_) => {
        tracing::warn!(
          op,
          key,
          timeout_ms = self.policy.fast_cache_timeout.as_millis() as u64,
          "fast cache command timed out"
        );
        None
      }
    }
  }

  async fn write_back(&self, key: &str, payload: &str) {
    let ttl = self.policy.fast_cache_ttl;
    self.bounded("write", key, self.cache.set(key, payload.as_bytes(), ttl)).await;
  }

  // ── Persistence ───────────────────────────────────────────────────────────

  /// Normalise `raw` and write it in one transaction. Nothing is visible
  /// unless the whole transaction commits.
  async fn persist(&self, id: &str, key: &str, raw: RawReport) -> Result<Report> {
    let kind = raw.kind();
    let now = Utc::now();
    let tx = self.store.begin().await.map_err(Error::persistence)?;

    let written = match raw {
      RawReport::Domain(envelope) => {
        self.write_domain(&tx, normalize_domain(id, envelope, now)).await
      }
      RawReport::Ip(envelope) => self.write_ip(&tx, normalize_ip(id, envelope, now)).await,
    };

    let (report, payload) = match written {
      Ok(written) => written,
      Err(e) => {
        tracing::error!(%kind, id, error = %e, "persisting report failed; rolling back");
        if let Err(rollback) = tx.rollback().await {
          tracing::warn!(%kind, id, error = %rollback, "rollback failed");
        }
        return Err(e);
      }
    };

    self.write_back(key, &payload).await;

    if let Err(e) = tx.commit().await {
      tracing::error!(%kind, id, error = %e, "commit failed");
      // Retract the write-back so the fast cache never outlives the store.
      self.bounded("retract", key, self.cache.delete(key)).await;
      return Err(Error::persistence(e));
    }

    Ok(report)
  }

  async fn write_domain(&self, tx: &S::Tx, record: DomainRecord) -> Result<(Report, String)> {
    let domain = tx.upsert_domain(&record.domain).await.map_err(Error::persistence)?;

    tokio::try_join!(
      tx.replace_domain_categories(&domain.id, &record.categories),
      tx.replace_domain_analysis(&domain.id, &record.analysis),
    )
    .map_err(Error::persistence)?;

    tx.upsert_domain_details(&record.details).await.map_err(Error::persistence)?;

    let report = Report::Domain(domain);
    let payload = report.to_json()?;
    tx.cache_put(report.id(), &payload, self.policy.persistent_cache_ttl)
      .await
      .map_err(Error::persistence)?;
    Ok((report, payload))
  }

  async fn write_ip(&self, tx: &S::Tx, record: IpRecord) -> Result<(Report, String)> {
    let ip = tx.upsert_ip(&record.ip).await.map_err(Error::persistence)?;

    tokio::try_join!(
      tx.replace_ip_tags(&ip.id, &record.tags),
      tx.replace_ip_analysis(&ip.id, &record.analysis),
    )
    .map_err(Error::persistence)?;

    tx.upsert_ip_details(&record.details).await.map_err(Error::persistence)?;

    let report = Report::Ip(ip);
    let payload = report.to_json()?;
    tx.cache_put(report.id(), &payload, self.policy.persistent_cache_ttl)
      .await
      .map_err(Error::persistence)?;
    Ok((report, payload))
  }
}
