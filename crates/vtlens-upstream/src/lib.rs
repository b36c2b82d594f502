//! Async HTTP client for the VirusTotal v3 object API.

use std::time::Duration;

use reqwest::{Client, Url};
use vtlens_core::{Error, Result, envelope::RawReport, subject::SubjectKind, upstream::Upstream};

pub const DEFAULT_BASE_URL: &str = "https://www.virustotal.com/api/v3";

/// Connection settings for the provider.
#[derive(Debug, Clone)]
pub struct VtConfig {
  pub base_url: String,
  pub api_key:  String,
  /// Whole-request deadline. `None` waits as long as the transport does.
  pub timeout:  Option<Duration>,
}

impl VtConfig {
  pub fn new(api_key: impl Into<String>) -> Self {
    Self {
      base_url: DEFAULT_BASE_URL.to_owned(),
      api_key:  api_key.into(),
      timeout:  None,
    }
  }
}

/// Client for `GET {base}/{domains|ip_addresses}/{id}`.
///
/// One request per call, authenticated with the `x-apikey` header. Cheap to
/// clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct VtClient {
  client:   Client,
  base_url: Url,
  api_key:  String,
}

impl VtClient {
  pub fn new(config: VtConfig) -> Result<Self> {
    let base_url = Url::parse(config.base_url.trim_end_matches('/'))
      .map_err(|e| Error::Fetch(format!("invalid base url {:?}: {e}", config.base_url)))?;
    if base_url.cannot_be_a_base() {
      return Err(Error::Fetch(format!("base url {:?} cannot have a path", config.base_url)));
    }

    let mut builder = Client::builder();
    if let Some(timeout) = config.timeout {
      builder = builder.timeout(timeout);
    }
    let client = builder
      .build()
      .map_err(|e| Error::Fetch(format!("failed to build HTTP client: {e}")))?;

    Ok(Self { client, base_url, api_key: config.api_key })
  }

  /// `{base}/{collection}/{id}`, with `id` percent-encoded as one segment.
  fn url(&self, kind: SubjectKind, id: &str) -> Url {
    let mut url = self.base_url.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
      segments.pop_if_empty().push(kind.collection()).push(id);
    }
    url
  }
}

impl Upstream for VtClient {
  async fn fetch(&self, kind: SubjectKind, id: &str) -> Result<RawReport> {
    let url = self.url(kind, id);
    tracing::debug!(%kind, id, "requesting upstream report");

    let resp = self
      .client
      .get(url)
      .header("x-apikey", &self.api_key)
      .send()
      .await
      .map_err(|e| Error::Fetch(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
      tracing::warn!(%kind, id, %status, "upstream returned non-success status");
      return Err(Error::UpstreamStatus { status: status.as_u16() });
    }

    let body = resp.bytes().await.map_err(|e| Error::Fetch(e.to_string()))?;
    RawReport::decode(kind, &body)
  }
}
