//! Encoding and decoding helpers between vtlens types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`),
//! so lexical order in SQL matches chronological order. Opaque provider
//! documents are stored as compact JSON text.

use chrono::{DateTime, SecondsFormat, SubsecRound as _, Utc};
use rusqlite::Row;
use vtlens_core::report::{
  AnalysisResult, AnalysisStats, CacheEntry, Domain, DomainDetails, IpAddress,
  IpDetails, RawDocument,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn encode_opt_dt(dt: Option<DateTime<Utc>>) -> Option<String> { dt.map(encode_dt) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

/// The current time at the precision the store keeps.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

// ─── RawDocument ─────────────────────────────────────────────────────────────

pub fn encode_doc(doc: Option<&RawDocument>) -> Result<Option<String>> {
  doc.map(|d| serde_json::to_string(&d.0)).transpose().map_err(Error::from)
}

pub fn decode_doc(s: Option<String>) -> Result<Option<RawDocument>> {
  s.as_deref()
    .map(serde_json::from_str::<serde_json::Value>)
    .transpose()
    .map(|v| v.and_then(RawDocument::from_value))
    .map_err(Error::from)
}

// ─── Domains ─────────────────────────────────────────────────────────────────

pub const DOMAIN_COLUMNS: &str = "id, type, creation_date, expiration_date, \
  last_analysis_date, reputation, registrar, tld, whois_date, harmless_count, \
  malicious_count, suspicious_count, undetected_count, timeout_count, \
  created_at, updated_at";

/// Raw values read directly from a `domains` row.
pub struct RawDomain {
  pub id:                 String,
  pub subject_type:       String,
  pub creation_date:      Option<String>,
  pub expiration_date:    Option<String>,
  pub last_analysis_date: Option<String>,
  pub reputation:         Option<i64>,
  pub registrar:          Option<String>,
  pub tld:                Option<String>,
  pub whois_date:         Option<String>,
  pub stats:              AnalysisStats,
  pub created_at:         String,
  pub updated_at:         String,
}

impl RawDomain {
  /// Read a row selected with [`DOMAIN_COLUMNS`].
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                 row.get(0)?,
      subject_type:       row.get(1)?,
      creation_date:      row.get(2)?,
      expiration_date:    row.get(3)?,
      last_analysis_date: row.get(4)?,
      reputation:         row.get(5)?,
      registrar:          row.get(6)?,
      tld:                row.get(7)?,
      whois_date:         row.get(8)?,
      stats:              stats_from_row(row, 9)?,
      created_at:         row.get(14)?,
      updated_at:         row.get(15)?,
    })
  }

  pub fn into_domain(self) -> Result<Domain> {
    Ok(Domain {
      id:                 self.id,
      subject_type:       self.subject_type,
      creation_date:      decode_opt_dt(self.creation_date)?,
      expiration_date:    decode_opt_dt(self.expiration_date)?,
      last_analysis_date: decode_opt_dt(self.last_analysis_date)?,
      reputation:         self.reputation,
      registrar:          self.registrar,
      tld:                self.tld,
      whois_date:         decode_opt_dt(self.whois_date)?,
      stats:              self.stats,
      created_at:         decode_dt(&self.created_at)?,
      updated_at:         decode_dt(&self.updated_at)?,
    })
  }
}

// ─── IP addresses ────────────────────────────────────────────────────────────

pub const IP_COLUMNS: &str = "id, type, last_analysis_date, asn, reputation, \
  country, as_owner, regional_internet_registry, network, whois_date, \
  last_modification_date, continent, harmless_count, malicious_count, \
  suspicious_count, undetected_count, timeout_count, created_at, updated_at";

/// Raw values read directly from an `ip_addresses` row.
pub struct RawIp {
  pub id:                         String,
  pub subject_type:               String,
  pub last_analysis_date:         Option<String>,
  pub asn:                        Option<i64>,
  pub reputation:                 Option<i64>,
  pub country:                    Option<String>,
  pub as_owner:                   Option<String>,
  pub regional_internet_registry: Option<String>,
  pub network:                    Option<String>,
  pub whois_date:                 Option<String>,
  pub last_modification_date:     Option<String>,
  pub continent:                  Option<String>,
  pub stats:                      AnalysisStats,
  pub created_at:                 String,
  pub updated_at:                 String,
}

impl RawIp {
  /// Read a row selected with [`IP_COLUMNS`].
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                         row.get(0)?,
      subject_type:               row.get(1)?,
      last_analysis_date:         row.get(2)?,
      asn:                        row.get(3)?,
      reputation:                 row.get(4)?,
      country:                    row.get(5)?,
      as_owner:                   row.get(6)?,
      regional_internet_registry: row.get(7)?,
      network:                    row.get(8)?,
      whois_date:                 row.get(9)?,
      last_modification_date:     row.get(10)?,
      continent:                  row.get(11)?,
      stats:                      stats_from_row(row, 12)?,
      created_at:                 row.get(17)?,
      updated_at:                 row.get(18)?,
    })
  }

  pub fn into_ip(self) -> Result<IpAddress> {
    Ok(IpAddress {
      id:                         self.id,
      subject_type:               self.subject_type,
      last_analysis_date:         decode_opt_dt(self.last_analysis_date)?,
      asn:                        self.asn,
      reputation:                 self.reputation,
      country:                    self.country,
      as_owner:                   self.as_owner,
      regional_internet_registry: self.regional_internet_registry,
      network:                    self.network,
      whois_date:                 decode_opt_dt(self.whois_date)?,
      last_modification_date:     decode_opt_dt(self.last_modification_date)?,
      continent:                  self.continent,
      stats:                      self.stats,
      created_at:                 decode_dt(&self.created_at)?,
      updated_at:                 decode_dt(&self.updated_at)?,
    })
  }
}

/// The five counters, stored in adjacent columns starting at `first`.
fn stats_from_row(row: &Row<'_>, first: usize) -> rusqlite::Result<AnalysisStats> {
  Ok(AnalysisStats {
    harmless_count:   row.get(first)?,
    malicious_count:  row.get(first + 1)?,
    suspicious_count: row.get(first + 2)?,
    undetected_count: row.get(first + 3)?,
    timeout_count:    row.get(first + 4)?,
  })
}

// ─── Dependents ──────────────────────────────────────────────────────────────

/// Read `engine_name, category, result, method`.
pub fn analysis_from_row(row: &Row<'_>) -> rusqlite::Result<AnalysisResult> {
  Ok(AnalysisResult {
    engine_name: row.get(0)?,
    category:    row.get(1)?,
    result:      row.get(2)?,
    method:      row.get(3)?,
  })
}

/// Raw values read directly from a `domain_details` row.
pub struct RawDomainDetails {
  pub domain_id:              String,
  pub last_dns_records:       Option<String>,
  pub last_https_certificate: Option<String>,
  pub rdap:                   Option<String>,
  pub whois:                  Option<String>,
  pub popularity_ranks:       Option<String>,
  pub total_votes:            Option<String>,
}

impl RawDomainDetails {
  pub fn into_details(self) -> Result<DomainDetails> {
    Ok(DomainDetails {
      domain_id:              self.domain_id,
      last_dns_records:       decode_doc(self.last_dns_records)?,
      last_https_certificate: decode_doc(self.last_https_certificate)?,
      rdap:                   decode_doc(self.rdap)?,
      whois:                  self.whois,
      popularity_ranks:       decode_doc(self.popularity_ranks)?,
      total_votes:            decode_doc(self.total_votes)?,
    })
  }
}

/// Raw values read directly from an `ip_details` row.
pub struct RawIpDetails {
  pub ip_id:       String,
  pub whois:       Option<String>,
  pub total_votes: Option<String>,
}

impl RawIpDetails {
  pub fn into_details(self) -> Result<IpDetails> {
    Ok(IpDetails {
      ip_id:       self.ip_id,
      whois:       self.whois,
      total_votes: decode_doc(self.total_votes)?,
    })
  }
}

// ─── Cache rows ──────────────────────────────────────────────────────────────

/// Raw values read directly from a `report_cache` row.
pub struct RawCacheEntry {
  pub id:         String,
  pub payload:    String,
  pub cached_at:  String,
  pub expires_at: String,
}

impl RawCacheEntry {
  pub fn into_entry(self) -> Result<CacheEntry> {
    Ok(CacheEntry {
      id:         self.id,
      payload:    self.payload,
      cached_at:  decode_dt(&self.cached_at)?,
      expires_at: decode_dt(&self.expires_at)?,
    })
  }
}
