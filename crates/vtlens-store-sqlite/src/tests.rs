//! Integration tests for `SqliteStore` against an in-memory database.

use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use vtlens_core::{
  report::{
    AnalysisResult, AnalysisStats, Category, Domain, DomainDetails, IpAddress, IpDetails,
    RawDocument,
  },
  store::{ReportStore, ReportTx},
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn domain(id: &str) -> Domain {
  let now = Utc::now();
  Domain {
    id:                 id.into(),
    subject_type:       "domain".into(),
    creation_date:      None,
    expiration_date:    None,
    last_analysis_date: None,
    reputation:         Some(0),
    registrar:          Some("Example Registrar".into()),
    tld:                Some("com".into()),
    whois_date:         None,
    stats:              AnalysisStats::default(),
    created_at:         now,
    updated_at:         now,
  }
}

fn ip(id: &str) -> IpAddress {
  let now = Utc::now();
  IpAddress {
    id:                         id.into(),
    subject_type:               "ip_address".into(),
    last_analysis_date:         None,
    asn:                        Some(15169),
    reputation:                 Some(10),
    country:                    Some("US".into()),
    as_owner:                   Some("GOOGLE".into()),
    regional_internet_registry: Some("ARIN".into()),
    network:                    Some("8.8.8.0/24".into()),
    whois_date:                 None,
    last_modification_date:     None,
    continent:                  Some("NA".into()),
    stats:                      AnalysisStats::default(),
    created_at:                 now,
    updated_at:                 now,
  }
}

fn category(engine: &str, value: &str) -> Category {
  Category { engine_name: engine.into(), category: value.into() }
}

fn verdict(engine: &str) -> AnalysisResult {
  AnalysisResult {
    engine_name: engine.into(),
    category:    "harmless".into(),
    result:      Some("clean".into()),
    method:      "blacklist".into(),
  }
}

/// Commit a domain with the given categories in one transaction.
async fn save_domain(s: &SqliteStore, d: &Domain, categories: &[Category]) -> Domain {
  let tx = s.begin().await.unwrap();
  let saved = tx.upsert_domain(d).await.unwrap();
  tx.replace_domain_categories(&d.id, categories).await.unwrap();
  tx.commit().await.unwrap();
  saved
}

async fn put(s: &SqliteStore, id: &str) {
  let tx = s.begin().await.unwrap();
  tx.cache_put(id, "{}", Duration::from_secs(3600)).await.unwrap();
  tx.commit().await.unwrap();
}

// ─── Subject entities ────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_and_get_domain() {
  let s = store().await;
  let saved = save_domain(&s, &domain("example.com"), &[]).await;

  let fetched = s.get_domain("example.com").await.unwrap().unwrap();
  assert_eq!(fetched, saved);
  assert_eq!(fetched.registrar.as_deref(), Some("Example Registrar"));
  assert!(fetched.creation_date.is_none());
}

#[tokio::test]
async fn get_missing_domain_returns_none() {
  let s = store().await;
  assert!(s.get_domain("nope.example").await.unwrap().is_none());
  assert!(s.get_ip("192.0.2.1").await.unwrap().is_none());
}

#[tokio::test]
async fn upsert_overwrites_fields_but_keeps_created_at() {
  let s = store().await;
  let first = save_domain(&s, &domain("example.com"), &[]).await;

  let mut refreshed = domain("example.com");
  refreshed.reputation = Some(-20);
  refreshed.created_at = first.created_at + chrono::Duration::hours(1);
  refreshed.updated_at = refreshed.created_at;
  let second = save_domain(&s, &refreshed, &[]).await;

  assert_eq!(second.created_at, first.created_at);
  assert_eq!(second.reputation, Some(-20));
  assert!(second.updated_at > first.updated_at);

  let fetched = s.get_domain("example.com").await.unwrap().unwrap();
  assert_eq!(fetched, second);
}

#[tokio::test]
async fn ip_roundtrips_through_upsert() {
  let s = store().await;
  let tx = s.begin().await.unwrap();
  let saved = tx.upsert_ip(&ip("8.8.8.8")).await.unwrap();
  tx.commit().await.unwrap();

  let fetched = s.get_ip("8.8.8.8").await.unwrap().unwrap();
  assert_eq!(fetched, saved);
  assert_eq!(fetched.asn, Some(15169));
}

// ─── Dependent collections ───────────────────────────────────────────────────

#[tokio::test]
async fn refresh_with_fewer_categories_leaves_only_new_set() {
  let s = store().await;
  let d = domain("example.com");
  save_domain(
    &s,
    &d,
    &[category("A", "search"), category("B", "portal"), category("C", "ads")],
  )
  .await;
  save_domain(&s, &d, &[category("B", "news")]).await;

  let view = s.domain_view("example.com").await.unwrap().unwrap();
  assert_eq!(view.categories, vec![category("B", "news")]);
}

#[tokio::test]
async fn refresh_with_no_categories_empties_collection() {
  let s = store().await;
  let d = domain("example.com");
  save_domain(&s, &d, &[category("A", "search")]).await;
  save_domain(&s, &d, &[]).await;

  let view = s.domain_view("example.com").await.unwrap().unwrap();
  assert!(view.categories.is_empty());
}

#[tokio::test]
async fn identical_refresh_is_idempotent() {
  let s = store().await;
  let d = domain("example.com");
  let cats = [category("A", "search"), category("B", "portal")];
  let verdicts = [verdict("B"), verdict("A")];
  let details = DomainDetails {
    domain_id:              d.id.clone(),
    last_dns_records:       Some(RawDocument(json!([{ "type": "A", "value": "93.184.216.34" }]))),
    last_https_certificate: None,
    rdap:                   None,
    whois:                  Some("Domain Name: EXAMPLE.COM".into()),
    popularity_ranks:       None,
    total_votes:            Some(RawDocument(json!({ "harmless": 3 }))),
  };

  let mut views = Vec::new();
  let mut rows = Vec::new();
  for _ in 0..2 {
    let tx = s.begin().await.unwrap();
    rows.push(tx.upsert_domain(&d).await.unwrap());
    tx.replace_domain_categories(&d.id, &cats).await.unwrap();
    tx.replace_domain_analysis(&d.id, &verdicts).await.unwrap();
    tx.upsert_domain_details(&details).await.unwrap();
    tx.commit().await.unwrap();
    views.push(s.domain_view("example.com").await.unwrap().unwrap());
  }

  assert_eq!(views[0], views[1]);
  assert_eq!(rows[0], rows[1]);
  assert_eq!(views[1].domain, rows[1]);
  assert_eq!(views[1].categories.len(), 2);
  assert_eq!(views[1].analysis_results.len(), 2);
  assert_eq!(views[1].details.as_ref(), Some(&details));
}

#[tokio::test]
async fn empty_engine_name_is_accepted() {
  let s = store().await;
  let tx = s.begin().await.unwrap();
  tx.upsert_domain(&domain("example.com")).await.unwrap();
  tx.replace_domain_categories("example.com", &[category("", "parked")]).await.unwrap();
  tx.replace_domain_analysis("example.com", &[verdict("")]).await.unwrap();
  tx.commit().await.unwrap();

  let view = s.domain_view("example.com").await.unwrap().unwrap();
  assert_eq!(view.categories, vec![category("", "parked")]);
  assert_eq!(view.analysis_results, vec![verdict("")]);
}

#[tokio::test]
async fn ip_view_keeps_tag_order_and_details() {
  let s = store().await;
  let tx = s.begin().await.unwrap();
  tx.upsert_ip(&ip("8.8.8.8")).await.unwrap();
  tx.replace_ip_tags("8.8.8.8", &["dns".into(), "anycast".into()]).await.unwrap();
  tx.replace_ip_analysis("8.8.8.8", &[verdict("Zeta"), verdict("Alpha")]).await.unwrap();
  tx.upsert_ip_details(&IpDetails {
    ip_id:       "8.8.8.8".into(),
    whois:       Some("NetRange: 8.8.8.0 - 8.8.8.255".into()),
    total_votes: Some(RawDocument(json!({ "harmless": 12, "malicious": 1 }))),
  })
  .await
  .unwrap();
  tx.commit().await.unwrap();

  let view = s.ip_view("8.8.8.8").await.unwrap().unwrap();
  assert_eq!(view.tags, vec!["dns".to_owned(), "anycast".to_owned()]);
  let engines: Vec<_> = view.analysis_results.iter().map(|r| r.engine_name.as_str()).collect();
  assert_eq!(engines, ["Alpha", "Zeta"]);
  let details = view.details.unwrap();
  assert_eq!(details.total_votes, Some(RawDocument(json!({ "harmless": 12, "malicious": 1 }))));
}

// ─── Details ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn domain_details_are_upserted_not_duplicated() {
  let s = store().await;
  let mut details = DomainDetails {
    domain_id:              "example.com".into(),
    last_dns_records:       Some(RawDocument(json!([{ "type": "A", "value": "93.184.216.34" }]))),
    last_https_certificate: None,
    rdap:                   None,
    whois:                  Some("old".into()),
    popularity_ranks:       None,
    total_votes:            None,
  };

  for whois in ["old", "new"] {
    details.whois = Some(whois.into());
    let tx = s.begin().await.unwrap();
    tx.upsert_domain(&domain("example.com")).await.unwrap();
    tx.upsert_domain_details(&details).await.unwrap();
    tx.commit().await.unwrap();
  }

  let view = s.domain_view("example.com").await.unwrap().unwrap();
  assert_eq!(view.details, Some(details));
}

// ─── Transactions ────────────────────────────────────────────────────────────

#[tokio::test]
async fn rollback_discards_every_write() {
  let s = store().await;
  let tx = s.begin().await.unwrap();
  tx.upsert_domain(&domain("example.com")).await.unwrap();
  tx.replace_domain_categories("example.com", &[category("A", "x")]).await.unwrap();
  tx.cache_put("example.com", "{}", Duration::from_secs(60)).await.unwrap();
  tx.rollback().await.unwrap();

  assert!(s.get_domain("example.com").await.unwrap().is_none());
  assert_eq!(s.cache_len().await.unwrap(), 0);
}

#[tokio::test]
async fn dropped_transaction_rolls_back() {
  let s = store().await;
  {
    let tx = s.begin().await.unwrap();
    tx.upsert_domain(&domain("example.com")).await.unwrap();
  }

  // The read waits for the scheduled rollback to release the store.
  assert!(s.get_domain("example.com").await.unwrap().is_none());

  // And the store is usable for new transactions afterwards.
  save_domain(&s, &domain("example.com"), &[]).await;
  assert!(s.get_domain("example.com").await.unwrap().is_some());
}

#[test]
fn transaction_dropped_outside_a_runtime_rolls_back() {
  let runtime = tokio::runtime::Runtime::new().unwrap();
  let (s, tx) = runtime.block_on(async {
    let s = store().await;
    let tx = s.begin().await.unwrap();
    tx.upsert_domain(&domain("example.com")).await.unwrap();
    (s, tx)
  });

  // No runtime is entered here.
  drop(tx);

  runtime.block_on(async {
    let read = tokio::time::timeout(Duration::from_secs(5), s.get_domain("example.com"))
      .await
      .expect("store still locked after the drop");
    assert!(read.unwrap().is_none());

    // A fresh BEGIN would fail if the old transaction were still open.
    save_domain(&s, &domain("example.com"), &[]).await;
    assert!(s.get_domain("example.com").await.unwrap().is_some());
  });
}

#[tokio::test]
async fn reads_do_not_observe_uncommitted_rows() {
  let s = store().await;
  let tx = s.begin().await.unwrap();
  tx.upsert_domain(&domain("example.com")).await.unwrap();

  let reader = {
    let s = s.clone();
    tokio::spawn(async move { s.get_domain("example.com").await.unwrap() })
  };
  tokio::task::yield_now().await;
  tx.rollback().await.unwrap();

  assert!(reader.await.unwrap().is_none());
}

// ─── Bounded persistent cache ────────────────────────────────────────────────

#[tokio::test]
async fn sixth_put_evicts_exactly_the_oldest() {
  let s = store().await;
  for id in ["a", "b", "c", "d", "e"] {
    put(&s, id).await;
  }
  assert_eq!(s.cache_len().await.unwrap(), 5);

  put(&s, "f").await;

  assert_eq!(s.cache_len().await.unwrap(), 5);
  assert!(s.cache_get("a").await.unwrap().is_none());
  for id in ["b", "c", "d", "e", "f"] {
    assert!(s.cache_get(id).await.unwrap().is_some(), "{id} should survive");
  }
}

#[tokio::test]
async fn updating_existing_id_when_full_still_evicts_oldest() {
  let s = store().await;
  for id in ["a", "b", "c", "d", "e"] {
    put(&s, id).await;
  }

  put(&s, "c").await;

  assert_eq!(s.cache_len().await.unwrap(), 4);
  assert!(s.cache_get("a").await.unwrap().is_none());
  assert!(s.cache_get("c").await.unwrap().is_some());
}

#[tokio::test]
async fn updating_below_capacity_does_not_evict() {
  let s = store().await;
  for id in ["a", "b", "c"] {
    put(&s, id).await;
  }
  put(&s, "a").await;

  assert_eq!(s.cache_len().await.unwrap(), 3);
  assert!(s.cache_get("a").await.unwrap().is_some());
}

#[tokio::test]
async fn cache_put_refreshes_payload_and_age() {
  let s = store().await;
  let tx = s.begin().await.unwrap();
  let first = tx.cache_put("a", "1", Duration::from_secs(60)).await.unwrap();
  tx.commit().await.unwrap();

  let tx = s.begin().await.unwrap();
  let second = tx.cache_put("a", "2", Duration::from_secs(60)).await.unwrap();
  tx.commit().await.unwrap();

  let hit = s.cache_get("a").await.unwrap().unwrap();
  assert_eq!(hit, second);
  assert_eq!(hit.payload, "2");
  assert!(hit.cached_at >= first.cached_at);
  assert!(hit.expires_at > hit.cached_at);
}

#[tokio::test]
async fn expired_rows_miss_but_linger_until_evicted() {
  let s = store().await.with_cache_capacity(2).unwrap();
  let tx = s.begin().await.unwrap();
  tx.cache_put("old", "{}", Duration::from_millis(1)).await.unwrap();
  tx.commit().await.unwrap();
  tokio::time::sleep(Duration::from_millis(20)).await;

  assert!(s.cache_get("old").await.unwrap().is_none());
  assert_eq!(s.cache_len().await.unwrap(), 1);

  put(&s, "b").await;
  assert_eq!(s.cache_len().await.unwrap(), 2);

  // Full: the expired row is the oldest, so it is the one to go.
  put(&s, "c").await;
  assert_eq!(s.cache_len().await.unwrap(), 2);
  assert!(s.cache_get("b").await.unwrap().is_some());
  assert!(s.cache_get("c").await.unwrap().is_some());
}

#[tokio::test]
async fn lowered_capacity_is_restored_on_next_put() {
  let s = store().await;
  for id in ["a", "b", "c", "d", "e"] {
    put(&s, id).await;
  }

  let s = s.with_cache_capacity(2).unwrap();
  put(&s, "f").await;

  assert_eq!(s.cache_len().await.unwrap(), 2);
  assert!(s.cache_get("e").await.unwrap().is_some());
  assert!(s.cache_get("f").await.unwrap().is_some());
}

#[tokio::test]
async fn concurrent_puts_never_exceed_capacity() {
  let s = store().await;
  let tasks: Vec<_> = (0..12)
    .map(|i| {
      let s = s.clone();
      tokio::spawn(async move { put(&s, &format!("id-{i:02}")).await })
    })
    .collect();
  for task in tasks {
    task.await.unwrap();
  }

  assert_eq!(s.cache_len().await.unwrap(), 5);
}

#[tokio::test]
async fn zero_ttl_is_rejected() {
  let s = store().await;
  let tx = s.begin().await.unwrap();
  let err = tx.cache_put("a", "{}", Duration::ZERO).await.unwrap_err();
  assert!(matches!(err, Error::InvalidTtl(_)));
}

#[tokio::test]
async fn zero_capacity_is_rejected() {
  let s = store().await;
  assert!(matches!(s.with_cache_capacity(0), Err(Error::InvalidCapacity)));
}
