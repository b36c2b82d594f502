//! SQL schema for the vtlens SQLite store.
//!
//! Executed once at connection startup. Every statement is idempotent.

/// Full schema DDL.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS domains (
    id                 TEXT PRIMARY KEY,
    type               TEXT NOT NULL,
    creation_date      TEXT,
    expiration_date    TEXT,
    last_analysis_date TEXT,
    reputation         INTEGER,
    registrar          TEXT,
    tld                TEXT,
    whois_date         TEXT,
    harmless_count     INTEGER,
    malicious_count    INTEGER,
    suspicious_count   INTEGER,
    undetected_count   INTEGER,
    timeout_count      INTEGER,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

-- Replaced wholesale on every refresh.
CREATE TABLE IF NOT EXISTS domain_categories (
    domain_id   TEXT NOT NULL REFERENCES domains(id) ON DELETE CASCADE,
    engine_name TEXT NOT NULL,
    category    TEXT NOT NULL,
    PRIMARY KEY (domain_id, engine_name)
);

CREATE TABLE IF NOT EXISTS domain_analysis_results (
    domain_id   TEXT NOT NULL REFERENCES domains(id) ON DELETE CASCADE,
    engine_name TEXT NOT NULL,
    category    TEXT NOT NULL,
    result      TEXT,
    method      TEXT NOT NULL,
    PRIMARY KEY (domain_id, engine_name)
);

-- One row per domain; JSON documents are stored verbatim.
CREATE TABLE IF NOT EXISTS domain_details (
    domain_id              TEXT PRIMARY KEY REFERENCES domains(id) ON DELETE CASCADE,
    last_dns_records       TEXT,
    last_https_certificate TEXT,
    rdap                   TEXT,
    whois                  TEXT,
    popularity_ranks       TEXT,
    total_votes            TEXT
);

CREATE TABLE IF NOT EXISTS ip_addresses (
    id                         TEXT PRIMARY KEY,
    type                       TEXT NOT NULL,
    last_analysis_date         TEXT,
    asn                        INTEGER,
    reputation                 INTEGER,
    country                    TEXT,
    as_owner                   TEXT,
    regional_internet_registry TEXT,
    network                    TEXT,
    whois_date                 TEXT,
    last_modification_date     TEXT,
    continent                  TEXT,
    harmless_count             INTEGER,
    malicious_count            INTEGER,
    suspicious_count           INTEGER,
    undetected_count           INTEGER,
    timeout_count              INTEGER,
    created_at                 TEXT NOT NULL,
    updated_at                 TEXT NOT NULL
);

-- Tags keep insertion order through the rowid.
CREATE TABLE IF NOT EXISTS ip_tags (
    id    INTEGER PRIMARY KEY,
    ip_id TEXT NOT NULL REFERENCES ip_addresses(id) ON DELETE CASCADE,
    tag   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ip_analysis_results (
    ip_id       TEXT NOT NULL REFERENCES ip_addresses(id) ON DELETE CASCADE,
    engine_name TEXT NOT NULL,
    category    TEXT NOT NULL,
    result      TEXT,
    method      TEXT NOT NULL,
    PRIMARY KEY (ip_id, engine_name)
);

CREATE TABLE IF NOT EXISTS ip_details (
    ip_id       TEXT PRIMARY KEY REFERENCES ip_addresses(id) ON DELETE CASCADE,
    whois       TEXT,
    total_votes TEXT
);

-- Capacity-bounded; shared by both subject kinds and keyed by identifier.
-- Timestamps are fixed-width RFC 3339 so text order is time order.
CREATE TABLE IF NOT EXISTS report_cache (
    id         TEXT PRIMARY KEY,
    payload    TEXT NOT NULL,
    cached_at  TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    CHECK (expires_at > cached_at)
);

CREATE INDEX IF NOT EXISTS ip_tags_ip_idx          ON ip_tags(ip_id);
CREATE INDEX IF NOT EXISTS report_cache_cached_idx ON report_cache(cached_at);

PRAGMA user_version = 1;
";
