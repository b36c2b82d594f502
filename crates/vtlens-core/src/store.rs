//! The `ReportStore` and `ReportTx` traits.
//!
//! Implemented by storage backends (e.g. `vtlens-store-sqlite`). The
//! orchestrator is the only writer and depends on these traits, not on any
//! concrete backend.

use std::{future::Future, time::Duration};

use crate::report::{
  AnalysisResult, CacheEntry, Category, Domain, DomainDetails, DomainView, IpAddress,
  IpDetails, IpView,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Durable home of subject entities, their dependents and the bounded
/// persistent cache.
///
/// Reads never observe writes of a transaction that has not committed.
pub trait ReportStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;
  type Tx: ReportTx<Error = Self::Error>;

  /// Open an exclusive write transaction.
  fn begin(&self) -> impl Future<Output = Result<Self::Tx, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn get_domain<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<Option<Domain>, Self::Error>> + Send + 'a;

  fn get_ip<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<Option<IpAddress>, Self::Error>> + Send + 'a;

  /// A domain with its categories, analysis results and details.
  fn domain_view<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<Option<DomainView>, Self::Error>> + Send + 'a;

  /// An IP address with its tags, analysis results and details.
  fn ip_view<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<Option<IpView>, Self::Error>> + Send + 'a;

  /// Bounded-cache lookup; only unexpired rows are hits.
  fn cache_get<'a>(
    &'a self,
    id: &'a str,
  ) -> impl Future<Output = Result<Option<CacheEntry>, Self::Error>> + Send + 'a;

  /// Number of rows currently held by the bounded cache, expired or not.
  fn cache_len(&self) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}

// ─── Transaction ─────────────────────────────────────────────────────────────

/// An open write transaction.
///
/// Methods take `&self` so that independent writes can be driven
/// concurrently and joined. Dropping a handle without calling
/// [`commit`](ReportTx::commit) rolls the transaction back.
pub trait ReportTx: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Subject entities ──────────────────────────────────────────────────

  /// Insert or overwrite a domain row. Returns the row as persisted: an
  /// existing row keeps its original `created_at`.
  fn upsert_domain<'a>(
    &'a self,
    domain: &'a Domain,
  ) -> impl Future<Output = Result<Domain, Self::Error>> + Send + 'a;

  /// Insert or overwrite an IP address row; see [`upsert_domain`](Self::upsert_domain).
  fn upsert_ip<'a>(
    &'a self,
    ip: &'a IpAddress,
  ) -> impl Future<Output = Result<IpAddress, Self::Error>> + Send + 'a;

  // ── Dependent collections, replaced wholesale ────────────────────────

  fn replace_domain_categories<'a>(
    &'a self,
    domain_id: &'a str,
    categories: &'a [Category],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn replace_domain_analysis<'a>(
    &'a self,
    domain_id: &'a str,
    results: &'a [AnalysisResult],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn replace_ip_tags<'a>(
    &'a self,
    ip_id: &'a str,
    tags: &'a [String],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn replace_ip_analysis<'a>(
    &'a self,
    ip_id: &'a str,
    results: &'a [AnalysisResult],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Details, single row, upserted ────────────────────────────────────

  fn upsert_domain_details<'a>(
    &'a self,
    details: &'a DomainDetails,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn upsert_ip_details<'a>(
    &'a self,
    details: &'a IpDetails,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Bounded persistent cache ──────────────────────────────────────────

  /// Write a bounded-cache row, evicting the oldest rows first when the
  /// cache is at capacity.
  fn cache_put<'a>(
    &'a self,
    id: &'a str,
    payload: &'a str,
    ttl: Duration,
  ) -> impl Future<Output = Result<CacheEntry, Self::Error>> + Send + 'a;

  // ── Completion ────────────────────────────────────────────────────────

  fn commit(self) -> impl Future<Output = Result<(), Self::Error>> + Send;

  fn rollback(self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
