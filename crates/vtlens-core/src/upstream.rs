//! The upstream provider seam.

use std::future::Future;

use crate::{Result, envelope::RawReport, subject::SubjectKind};

/// A client for the threat-intelligence provider.
///
/// Implementations make exactly one request per call: no retry, no backoff.
/// Failures map to [`Error::Fetch`](crate::Error::Fetch),
/// [`Error::UpstreamStatus`](crate::Error::UpstreamStatus) or
/// [`Error::Decode`](crate::Error::Decode).
pub trait Upstream: Send + Sync {
  fn fetch<'a>(
    &'a self,
    kind: SubjectKind,
    id: &'a str,
  ) -> impl Future<Output = Result<RawReport>> + Send + 'a;
}
