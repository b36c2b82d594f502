//! Subject kinds: the closed set of things a report can be requested for.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// The kind of subject a report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
  Domain,
  Ip,
}

impl SubjectKind {
  /// Canonical short name, used in cache keys and on the inbound API.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Domain => "domain",
      Self::Ip => "ip",
    }
  }

  /// The provider's collection segment (`/{collection}/{id}`).
  pub fn collection(self) -> &'static str {
    match self {
      Self::Domain => "domains",
      Self::Ip => "ip_addresses",
    }
  }

  /// Key under which a subject is stored in the fast cache tier.
  pub fn cache_key(self, id: &str) -> String { format!("{}:{id}", self.as_str()) }
}

impl fmt::Display for SubjectKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SubjectKind {
  type Err = Error;

  /// Accepts the canonical names as well as the provider's collection names.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "domain" | "domains" => Ok(Self::Domain),
      "ip" | "ip_address" | "ip_addresses" => Ok(Self::Ip),
      other => Err(Error::UnsupportedKind(other.to_owned())),
    }
  }
}

/// Trim and check a subject identifier.
pub fn validate_identifier(id: &str) -> Result<&str, Error> {
  let id = id.trim();
  if id.is_empty() {
    return Err(Error::EmptyIdentifier);
  }
  Ok(id)
}
