//! Turn a decoded provider envelope into the canonical entity plus its
//! dependent collections and details.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::{
  envelope::{DomainAttributes, EngineResult, Envelope, IpAttributes},
  report::{
    AnalysisResult, AnalysisStats, Category, Domain, DomainDetails, DomainRecord,
    IpAddress, IpDetails, IpRecord, RawDocument,
  },
};

/// Provider timestamps are epoch seconds; `0` means "unknown".
fn epoch(secs: Option<i64>) -> Option<DateTime<Utc>> {
  secs
    .filter(|&s| s != 0)
    .and_then(|s| DateTime::from_timestamp(s, 0))
}

fn stats(map: Option<&BTreeMap<String, i64>>) -> AnalysisStats {
  let Some(map) = map else { return AnalysisStats::default() };
  let count = |bucket: &str| Some(map.get(bucket).copied().unwrap_or(0));
  AnalysisStats {
    harmless_count:   count("harmless"),
    malicious_count:  count("malicious"),
    suspicious_count: count("suspicious"),
    undetected_count: count("undetected"),
    timeout_count:    count("timeout"),
  }
}

fn analysis(results: BTreeMap<String, EngineResult>) -> Vec<AnalysisResult> {
  results
    .into_iter()
    .map(|(engine_name, r)| AnalysisResult {
      engine_name,
      category: r.category.unwrap_or_default(),
      result: r.result,
      method: r.method.unwrap_or_default(),
    })
    .collect()
}

/// Normalise a domain report. `id` is the identifier that was requested and
/// keys every persisted row; `now` stamps `created_at` and `updated_at`.
pub fn normalize_domain(
  id: &str,
  envelope: Envelope<DomainAttributes>,
  now: DateTime<Utc>,
) -> DomainRecord {
  let data = envelope.data;
  let attrs = data.attributes;

  let domain = Domain {
    id:                 id.to_owned(),
    subject_type:       data.data_type,
    creation_date:      epoch(attrs.creation_date),
    expiration_date:    epoch(attrs.expiration_date),
    last_analysis_date: epoch(attrs.last_analysis_date),
    reputation:         attrs.reputation,
    registrar:          attrs.registrar,
    tld:                attrs.tld,
    whois_date:         epoch(attrs.whois_date),
    stats:              stats(attrs.last_analysis_stats.as_ref()),
    created_at:         now,
    updated_at:         now,
  };

  let categories = attrs
    .categories
    .into_iter()
    .map(|(engine_name, category)| Category { engine_name, category })
    .collect();

  let details = DomainDetails {
    domain_id:              id.to_owned(),
    last_dns_records:       RawDocument::from_value(attrs.last_dns_records),
    last_https_certificate: RawDocument::from_value(attrs.last_https_certificate),
    rdap:                   RawDocument::from_value(attrs.rdap),
    whois:                  attrs.whois,
    popularity_ranks:       RawDocument::from_value(attrs.popularity_ranks),
    total_votes:            RawDocument::from_value(attrs.total_votes),
  };

  DomainRecord {
    domain,
    categories,
    analysis: analysis(attrs.last_analysis_results),
    details,
  }
}

/// Normalise an IP address report.
pub fn normalize_ip(
  id: &str,
  envelope: Envelope<IpAttributes>,
  now: DateTime<Utc>,
) -> IpRecord {
  let data = envelope.data;
  let attrs = data.attributes;

  let ip = IpAddress {
    id:                         id.to_owned(),
    subject_type:               data.data_type,
    last_analysis_date:         epoch(attrs.last_analysis_date),
    asn:                        attrs.asn,
    reputation:                 attrs.reputation,
    country:                    attrs.country,
    as_owner:                   attrs.as_owner,
    regional_internet_registry: attrs.regional_internet_registry,
    network:                    attrs.network,
    whois_date:                 epoch(attrs.whois_date),
    last_modification_date:     epoch(attrs.last_modification_date),
    continent:                  attrs.continent,
    stats:                      stats(attrs.last_analysis_stats.as_ref()),
    created_at:                 now,
    updated_at:                 now,
  };

  let details = IpDetails {
    ip_id:       id.to_owned(),
    whois:       attrs.whois,
    total_votes: RawDocument::from_value(attrs.total_votes),
  };

  IpRecord {
    ip,
    tags: attrs.tags,
    analysis: analysis(attrs.last_analysis_results),
    details,
  }
}
