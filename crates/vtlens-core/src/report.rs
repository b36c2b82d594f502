//! Canonical subject entities and their dependent collections.
//!
//! These are the normalised, storage-facing shapes. The provider's own
//! response shape lives in [`crate::envelope`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::subject::SubjectKind;

// ─── Opaque documents ────────────────────────────────────────────────────────

/// A provider sub-document of variable shape (DNS records, certificate, RDAP,
/// popularity ranks, vote tally). Kept verbatim rather than mapped to columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawDocument(pub serde_json::Value);

impl RawDocument {
  /// `None` for JSON `null`, so absent documents persist as SQL `NULL`.
  pub fn from_value(value: serde_json::Value) -> Option<Self> {
    (!value.is_null()).then_some(Self(value))
  }
}

// ─── Analysis stats ──────────────────────────────────────────────────────────

/// Per-verdict engine counters from the last analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
  pub harmless_count:   Option<i64>,
  pub malicious_count:  Option<i64>,
  pub suspicious_count: Option<i64>,
  pub undetected_count: Option<i64>,
  pub timeout_count:    Option<i64>,
}

// ─── Subject entities ────────────────────────────────────────────────────────

/// A domain report, one row per domain name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
  pub id:                 String,
  #[serde(rename = "type")]
  pub subject_type:       String,
  pub creation_date:      Option<DateTime<Utc>>,
  pub expiration_date:    Option<DateTime<Utc>>,
  pub last_analysis_date: Option<DateTime<Utc>>,
  pub reputation:         Option<i64>,
  pub registrar:          Option<String>,
  pub tld:                Option<String>,
  pub whois_date:         Option<DateTime<Utc>>,
  #[serde(flatten)]
  pub stats:              AnalysisStats,
  pub created_at:         DateTime<Utc>,
  pub updated_at:         DateTime<Utc>,
}

/// An IP address report, one row per address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpAddress {
  pub id:                         String,
  #[serde(rename = "type")]
  pub subject_type:               String,
  pub last_analysis_date:         Option<DateTime<Utc>>,
  pub asn:                        Option<i64>,
  pub reputation:                 Option<i64>,
  pub country:                    Option<String>,
  pub as_owner:                   Option<String>,
  pub regional_internet_registry: Option<String>,
  pub network:                    Option<String>,
  pub whois_date:                 Option<DateTime<Utc>>,
  pub last_modification_date:     Option<DateTime<Utc>>,
  pub continent:                  Option<String>,
  #[serde(flatten)]
  pub stats:                      AnalysisStats,
  pub created_at:                 DateTime<Utc>,
  pub updated_at:                 DateTime<Utc>,
}

/// Either kind of subject entity, serialised without a wrapper.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Report {
  Domain(Domain),
  Ip(IpAddress),
}

impl Report {
  pub fn id(&self) -> &str {
    match self {
      Self::Domain(d) => &d.id,
      Self::Ip(ip) => &ip.id,
    }
  }

  /// Serialise the bare entity (the shape stored in both cache tiers).
  pub fn to_json(&self) -> serde_json::Result<String> { serde_json::to_string(self) }

  /// Decode a cached payload back into the entity of the given kind.
  pub fn from_json(kind: SubjectKind, bytes: &[u8]) -> serde_json::Result<Self> {
    Ok(match kind {
      SubjectKind::Domain => Self::Domain(serde_json::from_slice(bytes)?),
      SubjectKind::Ip => Self::Ip(serde_json::from_slice(bytes)?),
    })
  }
}

// ─── Dependent collections ───────────────────────────────────────────────────

/// One engine's category label for a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
  pub engine_name: String,
  pub category:    String,
}

/// One engine's verdict from the last analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
  pub engine_name: String,
  pub category:    String,
  pub result:      Option<String>,
  pub method:      String,
}

// ─── Details ─────────────────────────────────────────────────────────────────

/// Variable-shape sub-documents for a domain; a single row per domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainDetails {
  pub domain_id:              String,
  pub last_dns_records:       Option<RawDocument>,
  pub last_https_certificate: Option<RawDocument>,
  pub rdap:                   Option<RawDocument>,
  pub whois:                  Option<String>,
  pub popularity_ranks:       Option<RawDocument>,
  pub total_votes:            Option<RawDocument>,
}

/// Variable-shape sub-documents for an IP address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpDetails {
  pub ip_id:       String,
  pub whois:       Option<String>,
  pub total_votes: Option<RawDocument>,
}

// ─── Normalised bundles ──────────────────────────────────────────────────────

/// Everything persisted for a domain in one refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainRecord {
  pub domain:     Domain,
  pub categories: Vec<Category>,
  pub analysis:   Vec<AnalysisResult>,
  pub details:    DomainDetails,
}

/// Everything persisted for an IP address in one refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct IpRecord {
  pub ip:       IpAddress,
  pub tags:     Vec<String>,
  pub analysis: Vec<AnalysisResult>,
  pub details:  IpDetails,
}

// ─── Stored views ────────────────────────────────────────────────────────────

/// A domain read back from the store together with its dependents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainView {
  #[serde(flatten)]
  pub domain:           Domain,
  pub categories:       Vec<Category>,
  pub analysis_results: Vec<AnalysisResult>,
  pub details:          Option<DomainDetails>,
}

/// An IP address read back from the store together with its dependents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IpView {
  #[serde(flatten)]
  pub ip:               IpAddress,
  pub tags:             Vec<String>,
  pub analysis_results: Vec<AnalysisResult>,
  pub details:          Option<IpDetails>,
}

/// A row of the capacity-bounded persistent cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
  pub id:         String,
  pub payload:    String,
  pub cached_at:  DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
}
