//! The provider's response envelope: `{"data": {"id", "type", "attributes"}}`.
//!
//! Attributes are decoded leniently. Every scalar is optional and every map
//! defaults to empty, so a sparse report still decodes. Only a body that is
//! not the envelope at all (or has wrongly-typed fields) is a decode error.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{Error, Result, subject::SubjectKind};

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<A> {
  pub data: EnvelopeData<A>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvelopeData<A> {
  pub id:         String,
  #[serde(rename = "type")]
  pub data_type:  String,
  pub attributes: A,
}

/// One engine's entry in `last_analysis_results`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineResult {
  pub category: Option<String>,
  pub result:   Option<String>,
  pub method:   Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DomainAttributes {
  pub creation_date:          Option<i64>,
  pub expiration_date:        Option<i64>,
  pub last_analysis_date:     Option<i64>,
  pub whois_date:             Option<i64>,
  pub reputation:             Option<i64>,
  pub registrar:              Option<String>,
  pub tld:                    Option<String>,
  pub whois:                  Option<String>,
  pub categories:             BTreeMap<String, String>,
  pub last_analysis_stats:    Option<BTreeMap<String, i64>>,
  pub last_analysis_results:  BTreeMap<String, EngineResult>,
  pub last_dns_records:       serde_json::Value,
  pub last_https_certificate: serde_json::Value,
  pub rdap:                   serde_json::Value,
  pub popularity_ranks:       serde_json::Value,
  pub total_votes:            serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IpAttributes {
  pub last_analysis_date:         Option<i64>,
  pub whois_date:                 Option<i64>,
  pub last_modification_date:     Option<i64>,
  pub asn:                        Option<i64>,
  pub reputation:                 Option<i64>,
  pub country:                    Option<String>,
  pub as_owner:                   Option<String>,
  pub regional_internet_registry: Option<String>,
  pub network:                    Option<String>,
  pub continent:                  Option<String>,
  pub whois:                      Option<String>,
  pub tags:                       Vec<String>,
  pub last_analysis_stats:        Option<BTreeMap<String, i64>>,
  pub last_analysis_results:      BTreeMap<String, EngineResult>,
  pub total_votes:                serde_json::Value,
}

/// A decoded provider response for either subject kind.
#[derive(Debug, Clone)]
pub enum RawReport {
  Domain(Envelope<DomainAttributes>),
  Ip(Envelope<IpAttributes>),
}

impl RawReport {
  /// Decode a response body according to the kind that was requested.
  pub fn decode(kind: SubjectKind, body: &[u8]) -> Result<Self> {
    let decoded = match kind {
      SubjectKind::Domain => serde_json::from_slice(body).map(Self::Domain),
      SubjectKind::Ip => serde_json::from_slice(body).map(Self::Ip),
    };
    decoded.map_err(|e| Error::Decode(e.to_string()))
  }

  pub fn kind(&self) -> SubjectKind {
    match self {
      Self::Domain(_) => SubjectKind::Domain,
      Self::Ip(_) => SubjectKind::Ip,
    }
  }
}
