//! Process configuration, layered from `config.toml` and `VTLENS_*`
//! environment variables.

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use vtlens_upstream::{DEFAULT_BASE_URL, VtConfig};

use crate::orchestrator::Policy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
  #[error("vt_api_key must not be empty")]
  MissingApiKey,

  #[error("{0} must be greater than zero")]
  Zero(&'static str),
}

/// Runtime server configuration.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                      String,
  #[serde(default = "default_port")]
  pub port:                      u16,
  pub store_path:                PathBuf,
  pub vt_api_key:                String,
  #[serde(default = "default_vt_base_url")]
  pub vt_base_url:               String,
  /// Unset means no client-side deadline.
  #[serde(default)]
  pub upstream_timeout_secs:     Option<u64>,
  /// Unset selects the in-process fast cache.
  #[serde(default)]
  pub redis_url:                 Option<String>,
  #[serde(default)]
  pub redis_password:            Option<String>,
  #[serde(default = "one_hour")]
  pub fast_cache_ttl_secs:       u64,
  /// Entry bound for the in-process fast cache; ignored with Redis.
  #[serde(default = "default_fast_capacity")]
  pub fast_cache_capacity:       u64,
  /// Deadline for each fast cache command.
  #[serde(default = "default_fast_timeout_ms")]
  pub fast_cache_timeout_ms:     u64,
  #[serde(default = "one_hour")]
  pub persistent_cache_ttl_secs: u64,
  #[serde(default = "default_capacity")]
  pub persistent_cache_capacity: usize,
  #[serde(default = "one_day")]
  pub ip_freshness_secs:         u64,
}

fn default_host() -> String { "0.0.0.0".into() }

fn default_port() -> u16 { 8080 }

fn default_vt_base_url() -> String { DEFAULT_BASE_URL.into() }

fn default_capacity() -> usize { vtlens_store_sqlite::DEFAULT_CACHE_CAPACITY }

fn default_fast_capacity() -> u64 { vtlens_cache::DEFAULT_MEMORY_CAPACITY }

fn default_fast_timeout_ms() -> u64 { 500 }

fn one_hour() -> u64 { 60 * 60 }

fn one_day() -> u64 { 24 * 60 * 60 }

impl ServerConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.vt_api_key.trim().is_empty() {
      return Err(ConfigError::MissingApiKey);
    }
    let positive = [
      ("fast_cache_ttl_secs", self.fast_cache_ttl_secs),
      ("fast_cache_capacity", self.fast_cache_capacity),
      ("fast_cache_timeout_ms", self.fast_cache_timeout_ms),
      ("persistent_cache_ttl_secs", self.persistent_cache_ttl_secs),
      ("ip_freshness_secs", self.ip_freshness_secs),
      ("upstream_timeout_secs", self.upstream_timeout_secs.unwrap_or(1)),
    ];
    if let Some((name, _)) = positive.into_iter().find(|&(_, v)| v == 0) {
      return Err(ConfigError::Zero(name));
    }
    if self.persistent_cache_capacity == 0 {
      return Err(ConfigError::Zero("persistent_cache_capacity"));
    }
    Ok(())
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn policy(&self) -> Policy {
    Policy {
      fast_cache_ttl:       Duration::from_secs(self.fast_cache_ttl_secs),
      fast_cache_timeout:   Duration::from_millis(self.fast_cache_timeout_ms),
      persistent_cache_ttl: Duration::from_secs(self.persistent_cache_ttl_secs),
      ip_freshness:         Duration::from_secs(self.ip_freshness_secs),
    }
  }

  pub fn vt_config(&self) -> VtConfig {
    VtConfig {
      base_url: self.vt_base_url.clone(),
      api_key:  self.vt_api_key.clone(),
      timeout:  self.upstream_timeout_secs.map(Duration::from_secs),
    }
  }
}
