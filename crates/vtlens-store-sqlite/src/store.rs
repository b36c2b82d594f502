//! [`SqliteStore`], the SQLite implementation of [`ReportStore`], and
//! [`SqliteTx`], its write transaction.

use std::{path::Path, sync::Arc, time::Duration};

use chrono::SubsecRound as _;
use rusqlite::{Connection, OptionalExtension as _};
use tokio::sync::{Mutex, OwnedMutexGuard};
use vtlens_core::{
  report::{
    AnalysisResult, CacheEntry, Category, Domain, DomainDetails, DomainView, IpAddress,
    IpDetails, IpView,
  },
  store::{ReportStore, ReportTx},
};

use crate::{
  Error, Result,
  encode::{
    DOMAIN_COLUMNS, IP_COLUMNS, RawCacheEntry, RawDomain, RawDomainDetails, RawIp,
    RawIpDetails, analysis_from_row, encode_doc, encode_dt, encode_opt_dt, now,
  },
  schema::SCHEMA,
};

/// Bounded persistent cache capacity used unless configured otherwise.
pub const DEFAULT_CACHE_CAPACITY: usize = 5;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A vtlens store backed by a single SQLite file.
///
/// Every access goes through `gate`: reads hold it for one call, a
/// [`SqliteTx`] holds it from `BEGIN` until it commits or rolls back. Reads
/// therefore never see uncommitted rows, and the bounded cache's
/// count/evict/insert sequence can never interleave with another writer.
///
/// Cloning is cheap; the connection and gate are reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:     tokio_rusqlite::Connection,
  gate:     Arc<Mutex<()>>,
  capacity: usize,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        // Another process holding the write lock is waited for, not failed on.
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self {
      conn,
      gate: Arc::new(Mutex::new(())),
      capacity: DEFAULT_CACHE_CAPACITY,
    })
  }

  /// Set the maximum number of bounded-cache rows.
  pub fn with_cache_capacity(mut self, capacity: usize) -> Result<Self> {
    if capacity == 0 {
      return Err(Error::InvalidCapacity);
    }
    self.capacity = capacity;
    Ok(self)
  }

  pub fn cache_capacity(&self) -> usize { self.capacity }

  /// Run a read-only closure on the connection while holding the gate.
  async fn read<F, R>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&mut Connection) -> std::result::Result<R, tokio_rusqlite::Error>
      + Send
      + 'static,
    R: Send + 'static,
  {
    let _gate = self.gate.lock().await;
    Ok(self.conn.call(f).await?)
  }
}

// ─── Row selection helpers ───────────────────────────────────────────────────

fn select_domain(conn: &Connection, id: &str) -> rusqlite::Result<Option<RawDomain>> {
  conn
    .query_row(
      &format!("SELECT {DOMAIN_COLUMNS} FROM domains WHERE id = ?1"),
      rusqlite::params![id],
      RawDomain::from_row,
    )
    .optional()
}

fn select_ip(conn: &Connection, id: &str) -> rusqlite::Result<Option<RawIp>> {
  conn
    .query_row(
      &format!("SELECT {IP_COLUMNS} FROM ip_addresses WHERE id = ?1"),
      rusqlite::params![id],
      RawIp::from_row,
    )
    .optional()
}

fn select_analysis(
  conn: &Connection,
  table: &str,
  parent_column: &str,
  parent_id: &str,
) -> rusqlite::Result<Vec<AnalysisResult>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT engine_name, category, result, method FROM {table}
     WHERE {parent_column} = ?1 ORDER BY engine_name"
  ))?;
  let rows = stmt
    .query_map(rusqlite::params![parent_id], analysis_from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

// ─── ReportStore impl ────────────────────────────────────────────────────────

impl ReportStore for SqliteStore {
  type Error = Error;
  type Tx = SqliteTx;

  async fn begin(&self) -> Result<SqliteTx> {
    let guard = self.gate.clone().lock_owned().await;
    self
      .conn
      .call(|conn| {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
      })
      .await?;

    Ok(SqliteTx {
      conn:     self.conn.clone(),
      capacity: self.capacity,
      guard:    Some(guard),
    })
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_domain(&self, id: &str) -> Result<Option<Domain>> {
    let id = id.to_owned();
    let raw = self.read(move |conn| Ok(select_domain(conn, &id)?)).await?;
    raw.map(RawDomain::into_domain).transpose()
  }

  async fn get_ip(&self, id: &str) -> Result<Option<IpAddress>> {
    let id = id.to_owned();
    let raw = self.read(move |conn| Ok(select_ip(conn, &id)?)).await?;
    raw.map(RawIp::into_ip).transpose()
  }

  async fn domain_view(&self, id: &str) -> Result<Option<DomainView>> {
    let id = id.to_owned();

    let raw = self
      .read(move |conn| {
        let Some(domain) = select_domain(conn, &id)? else {
          return Ok(None);
        };

        let categories = conn
          .prepare(
            "SELECT engine_name, category FROM domain_categories
             WHERE domain_id = ?1 ORDER BY engine_name",
          )?
          .query_map(rusqlite::params![id], |row| {
            Ok(Category {
              engine_name: row.get(0)?,
              category:    row.get(1)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let analysis =
          select_analysis(conn, "domain_analysis_results", "domain_id", &id)?;

        let details = conn
          .query_row(
            "SELECT domain_id, last_dns_records, last_https_certificate, rdap,
                    whois, popularity_ranks, total_votes
             FROM domain_details WHERE domain_id = ?1",
            rusqlite::params![id],
            |row| {
              Ok(RawDomainDetails {
                domain_id:              row.get(0)?,
                last_dns_records:       row.get(1)?,
                last_https_certificate: row.get(2)?,
                rdap:                   row.get(3)?,
                whois:                  row.get(4)?,
                popularity_ranks:       row.get(5)?,
                total_votes:            row.get(6)?,
              })
            },
          )
          .optional()?;

        Ok(Some((domain, categories, analysis, details)))
      })
      .await?;

    let Some((domain, categories, analysis_results, details)) = raw else {
      return Ok(None);
    };

    Ok(Some(DomainView {
      domain: domain.into_domain()?,
      categories,
      analysis_results,
      details: details.map(RawDomainDetails::into_details).transpose()?,
    }))
  }

  async fn ip_view(&self, id: &str) -> Result<Option<IpView>> {
    let id = id.to_owned();

    let raw = self
      .read(move |conn| {
        let Some(ip) = select_ip(conn, &id)? else {
          return Ok(None);
        };

        let tags = conn
          .prepare("SELECT tag FROM ip_tags WHERE ip_id = ?1 ORDER BY id")?
          .query_map(rusqlite::params![id], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;

        let analysis = select_analysis(conn, "ip_analysis_results", "ip_id", &id)?;

        let details = conn
          .query_row(
            "SELECT ip_id, whois, total_votes FROM ip_details WHERE ip_id = ?1",
            rusqlite::params![id],
            |row| {
              Ok(RawIpDetails {
                ip_id:       row.get(0)?,
                whois:       row.get(1)?,
                total_votes: row.get(2)?,
              })
            },
          )
          .optional()?;

        Ok(Some((ip, tags, analysis, details)))
      })
      .await?;

    let Some((ip, tags, analysis_results, details)) = raw else {
      return Ok(None);
    };

    Ok(Some(IpView {
      ip: ip.into_ip()?,
      tags,
      analysis_results,
      details: details.map(RawIpDetails::into_details).transpose()?,
    }))
  }

  async fn cache_get(&self, id: &str) -> Result<Option<CacheEntry>> {
    let id = id.to_owned();
    let now_str = encode_dt(now());

    let raw = self
      .read(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT id, payload, cached_at, expires_at FROM report_cache
               WHERE id = ?1 AND expires_at > ?2",
              rusqlite::params![id, now_str],
              |row| {
                Ok(RawCacheEntry {
                  id:         row.get(0)?,
                  payload:    row.get(1)?,
                  cached_at:  row.get(2)?,
                  expires_at: row.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawCacheEntry::into_entry).transpose()
  }

  async fn cache_len(&self) -> Result<usize> {
    let count: i64 = self
      .read(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM report_cache", [], |r| r.get(0))?)
      })
      .await?;
    Ok(usize::try_from(count).unwrap_or_default())
  }
}

// ─── Transaction ─────────────────────────────────────────────────────────────

/// An open `BEGIN IMMEDIATE` transaction on a [`SqliteStore`].
///
/// Holds the store's gate until [`commit`](ReportTx::commit) or
/// [`rollback`](ReportTx::rollback). If dropped while still open (an early
/// return, a panic, a cancelled future) it schedules a `ROLLBACK` and
/// releases the gate only once that has run. Dropped outside a runtime, it
/// rolls back on a private one before returning; if even that fails the gate
/// stays closed for good, so no caller can run inside the orphaned
/// transaction.
pub struct SqliteTx {
  conn:     tokio_rusqlite::Connection,
  capacity: usize,
  guard:    Option<OwnedMutexGuard<()>>,
}

impl SqliteTx {
  async fn finish(&mut self, statement: &'static str) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(statement)?;
        Ok(())
      })
      .await?;
    self.guard = None;
    Ok(())
  }

  async fn replace_analysis(
    &self,
    table: &'static str,
    parent_column: &'static str,
    parent_id: &str,
    results: &[AnalysisResult],
  ) -> Result<()> {
    let parent_id = parent_id.to_owned();
    let rows = results.to_vec();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!("DELETE FROM {table} WHERE {parent_column} = ?1"),
          rusqlite::params![parent_id],
        )?;
        let mut stmt = conn.prepare(&format!(
          "INSERT INTO {table} ({parent_column}, engine_name, category, result, method)
           VALUES (?1, ?2, ?3, ?4, ?5)"
        ))?;
        for row in &rows {
          stmt.execute(rusqlite::params![
            parent_id,
            row.engine_name,
            row.category,
            row.result,
            row.method,
          ])?;
        }
        Ok(())
      })
      .await?;
    Ok(())
  }
}

impl Drop for SqliteTx {
  fn drop(&mut self) {
    let Some(guard) = self.guard.take() else { return };
    let conn = self.conn.clone();

    match tokio::runtime::Handle::try_current() {
      Ok(handle) => {
        handle.spawn(async move {
          let rolled_back = conn
            .call(|conn| {
              conn.execute_batch("ROLLBACK")?;
              Ok(())
            })
            .await;
          if let Err(e) = rolled_back {
            tracing::warn!(error = %e, "rollback of abandoned transaction failed");
          }
          drop(guard);
        });
      }
      Err(_) => match rollback_blocking(&conn) {
        Ok(()) => drop(guard),
        Err(e) => {
          tracing::error!(error = %e, "rollback of abandoned transaction failed; store stays locked");
          std::mem::forget(guard);
        }
      },
    }
  }
}

/// Run `ROLLBACK` to completion from synchronous code with no ambient runtime.
fn rollback_blocking(conn: &tokio_rusqlite::Connection) -> Result<()> {
  let runtime = tokio::runtime::Builder::new_current_thread().build()?;
  runtime.block_on(conn.call(|conn| {
    conn.execute_batch("ROLLBACK")?;
    Ok(())
  }))?;
  Ok(())
}

// ─── ReportTx impl ───────────────────────────────────────────────────────────

impl ReportTx for SqliteTx {
  type Error = Error;

  // ── Subject entities ──────────────────────────────────────────────────────

  async fn upsert_domain(&self, domain: &Domain) -> Result<Domain> {
    let id                 = domain.id.clone();
    let subject_type       = domain.subject_type.clone();
    let creation_date      = encode_opt_dt(domain.creation_date);
    let expiration_date    = encode_opt_dt(domain.expiration_date);
    let last_analysis_date = encode_opt_dt(domain.last_analysis_date);
    let reputation         = domain.reputation;
    let registrar          = domain.registrar.clone();
    let tld                = domain.tld.clone();
    let whois_date         = encode_opt_dt(domain.whois_date);
    let stats              = domain.stats;
    let created_at         = encode_dt(domain.created_at);
    let updated_at         = encode_dt(domain.updated_at);

    let raw = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!(
            "INSERT INTO domains ({DOMAIN_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT (id) DO UPDATE SET
               type               = excluded.type,
               creation_date      = excluded.creation_date,
               expiration_date    = excluded.expiration_date,
               last_analysis_date = excluded.last_analysis_date,
               reputation         = excluded.reputation,
               registrar          = excluded.registrar,
               tld                = excluded.tld,
               whois_date         = excluded.whois_date,
               harmless_count     = excluded.harmless_count,
               malicious_count    = excluded.malicious_count,
               suspicious_count   = excluded.suspicious_count,
               undetected_count   = excluded.undetected_count,
               timeout_count      = excluded.timeout_count,
               updated_at         = excluded.updated_at
             RETURNING {DOMAIN_COLUMNS}"
          ),
          rusqlite::params![
            id,
            subject_type,
            creation_date,
            expiration_date,
            last_analysis_date,
            reputation,
            registrar,
            tld,
            whois_date,
            stats.harmless_count,
            stats.malicious_count,
            stats.suspicious_count,
            stats.undetected_count,
            stats.timeout_count,
            created_at,
            updated_at,
          ],
          RawDomain::from_row,
        )?)
      })
      .await?;

    raw.into_domain()
  }

  async fn upsert_ip(&self, ip: &IpAddress) -> Result<IpAddress> {
    let id                         = ip.id.clone();
    let subject_type               = ip.subject_type.clone();
    let last_analysis_date         = encode_opt_dt(ip.last_analysis_date);
    let asn                        = ip.asn;
    let reputation                 = ip.reputation;
    let country                    = ip.country.clone();
    let as_owner                   = ip.as_owner.clone();
    let regional_internet_registry = ip.regional_internet_registry.clone();
    let network                    = ip.network.clone();
    let whois_date                 = encode_opt_dt(ip.whois_date);
    let last_modification_date     = encode_opt_dt(ip.last_modification_date);
    let continent                  = ip.continent.clone();
    let stats                      = ip.stats;
    let created_at                 = encode_dt(ip.created_at);
    let updated_at                 = encode_dt(ip.updated_at);

    let raw = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!(
            "INSERT INTO ip_addresses ({IP_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                     ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
             ON CONFLICT (id) DO UPDATE SET
               type                       = excluded.type,
               last_analysis_date         = excluded.last_analysis_date,
               asn                        = excluded.asn,
               reputation                 = excluded.reputation,
               country                    = excluded.country,
               as_owner                   = excluded.as_owner,
               regional_internet_registry = excluded.regional_internet_registry,
               network                    = excluded.network,
               whois_date                 = excluded.whois_date,
               last_modification_date     = excluded.last_modification_date,
               continent                  = excluded.continent,
               harmless_count             = excluded.harmless_count,
               malicious_count            = excluded.malicious_count,
               suspicious_count           = excluded.suspicious_count,
               undetected_count           = excluded.undetected_count,
               timeout_count              = excluded.timeout_count,
               updated_at                 = excluded.updated_at
             RETURNING {IP_COLUMNS}"
          ),
          rusqlite::params![
            id,
            subject_type,
            last_analysis_date,
            asn,
            reputation,
            country,
            as_owner,
            regional_internet_registry,
            network,
            whois_date,
            last_modification_date,
            continent,
            stats.harmless_count,
            stats.malicious_count,
            stats.suspicious_count,
            stats.undetected_count,
            stats.timeout_count,
            created_at,
            updated_at,
          ],
          RawIp::from_row,
        )?)
      })
      .await?;

    raw.into_ip()
  }

  // ── Dependent collections ─────────────────────────────────────────────────

  async fn replace_domain_categories(
    &self,
    domain_id: &str,
    categories: &[Category],
  ) -> Result<()> {
    let domain_id = domain_id.to_owned();
    let rows = categories.to_vec();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM domain_categories WHERE domain_id = ?1",
          rusqlite::params![domain_id],
        )?;
        let mut stmt = conn.prepare(
          "INSERT INTO domain_categories (domain_id, engine_name, category)
           VALUES (?1, ?2, ?3)",
        )?;
        for row in &rows {
          stmt.execute(rusqlite::params![domain_id, row.engine_name, row.category])?;
        }
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn replace_domain_analysis(
    &self,
    domain_id: &str,
    results: &[AnalysisResult],
  ) -> Result<()> {
    self
      .replace_analysis("domain_analysis_results", "domain_id", domain_id, results)
      .await
  }

  async fn replace_ip_tags(&self, ip_id: &str, tags: &[String]) -> Result<()> {
    let ip_id = ip_id.to_owned();
    let tags = tags.to_vec();

    self
      .conn
      .call(move |conn| {
        conn.execute("DELETE FROM ip_tags WHERE ip_id = ?1", rusqlite::params![ip_id])?;
        let mut stmt = conn.prepare("INSERT INTO ip_tags (ip_id, tag) VALUES (?1, ?2)")?;
        for tag in &tags {
          stmt.execute(rusqlite::params![ip_id, tag])?;
        }
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn replace_ip_analysis(&self, ip_id: &str, results: &[AnalysisResult]) -> Result<()> {
    self
      .replace_analysis("ip_analysis_results", "ip_id", ip_id, results)
      .await
  }

  // ── Details ───────────────────────────────────────────────────────────────

  async fn upsert_domain_details(&self, details: &DomainDetails) -> Result<()> {
    let domain_id              = details.domain_id.clone();
    let last_dns_records       = encode_doc(details.last_dns_records.as_ref())?;
    let last_https_certificate = encode_doc(details.last_https_certificate.as_ref())?;
    let rdap                   = encode_doc(details.rdap.as_ref())?;
    let whois                  = details.whois.clone();
    let popularity_ranks       = encode_doc(details.popularity_ranks.as_ref())?;
    let total_votes            = encode_doc(details.total_votes.as_ref())?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO domain_details (
             domain_id, last_dns_records, last_https_certificate, rdap,
             whois, popularity_ranks, total_votes
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT (domain_id) DO UPDATE SET
             last_dns_records       = excluded.last_dns_records,
             last_https_certificate = excluded.last_https_certificate,
             rdap                   = excluded.rdap,
             whois                  = excluded.whois,
             popularity_ranks       = excluded.popularity_ranks,
             total_votes            = excluded.total_votes",
          rusqlite::params![
            domain_id,
            last_dns_records,
            last_https_certificate,
            rdap,
            whois,
            popularity_ranks,
            total_votes,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn upsert_ip_details(&self, details: &IpDetails) -> Result<()> {
    let ip_id       = details.ip_id.clone();
    let whois       = details.whois.clone();
    let total_votes = encode_doc(details.total_votes.as_ref())?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO ip_details (ip_id, whois, total_votes) VALUES (?1, ?2, ?3)
           ON CONFLICT (ip_id) DO UPDATE SET
             whois       = excluded.whois,
             total_votes = excluded.total_votes",
          rusqlite::params![ip_id, whois, total_votes],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Bounded persistent cache ──────────────────────────────────────────────

  async fn cache_put(&self, id: &str, payload: &str, ttl: Duration) -> Result<CacheEntry> {
    let ttl_chrono = chrono::Duration::from_std(ttl).map_err(|_| Error::InvalidTtl(ttl))?;
    let cached_at = now();
    let expires_at = cached_at
      .checked_add_signed(ttl_chrono)
      .ok_or(Error::InvalidTtl(ttl))?
      .trunc_subsecs(6);
    if expires_at <= cached_at {
      return Err(Error::InvalidTtl(ttl));
    }

    let entry = CacheEntry {
      id:      id.to_owned(),
      payload: payload.to_owned(),
      cached_at,
      expires_at,
    };

    let id_str         = entry.id.clone();
    let payload_str    = entry.payload.clone();
    let cached_at_str  = encode_dt(cached_at);
    let expires_at_str = encode_dt(expires_at);
    let capacity       = i64::try_from(self.capacity).unwrap_or(i64::MAX);

    let evicted: Vec<String> = self
      .conn
      .call(move |conn| {
        let count: i64 =
          conn.query_row("SELECT COUNT(*) FROM report_cache", [], |r| r.get(0))?;

        // Oldest first. Normally exactly one row; more only when the table
        // was left over-full by a lowered capacity.
        let evicted = if count >= capacity {
          conn
            .prepare(
              "DELETE FROM report_cache WHERE id IN (
                 SELECT id FROM report_cache ORDER BY cached_at ASC, id ASC LIMIT ?1
               ) RETURNING id",
            )?
            .query_map(rusqlite::params![count - capacity + 1], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?
        } else {
          Vec::new()
        };

        conn.execute(
          "INSERT INTO report_cache (id, payload, cached_at, expires_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (id) DO UPDATE SET
             payload    = excluded.payload,
             cached_at  = excluded.cached_at,
             expires_at = excluded.expires_at",
          rusqlite::params![id_str, payload_str, cached_at_str, expires_at_str],
        )?;

        Ok(evicted)
      })
      .await?;

    if !evicted.is_empty() {
      tracing::debug!(id = %entry.id, ?evicted, "bounded cache at capacity; evicted oldest");
    }

    Ok(entry)
  }

  // ── Completion ────────────────────────────────────────────────────────────

  async fn commit(mut self) -> Result<()> { self.finish("COMMIT").await }

  async fn rollback(mut self) -> Result<()> { self.finish("ROLLBACK").await }
}
