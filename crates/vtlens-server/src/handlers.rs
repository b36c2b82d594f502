//! Route handlers.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/report/{id}?type=domain\|ip` | Tiered lookup; may call upstream |
//! | `GET`  | `/domains/{id}` | Stored view only; 404 if absent |
//! | `GET`  | `/ip_addresses/{id}` | Stored view only; 404 if absent |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::Deserialize;
use vtlens_core::{
  cache::FastCache,
  report::{DomainView, IpView, Report},
  store::ReportStore,
  subject::{SubjectKind, validate_identifier},
  upstream::Upstream,
};

use crate::{AppState, error::ApiError};

// ─── Report ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ReportParams {
  #[serde(rename = "type")]
  pub kind: Option<String>,
}

/// `GET /report/{id}?type=<kind>`
///
/// The lookup runs on its own task, so a client that disconnects does not
/// cancel a refresh halfway through.
pub async fn report<S, C, U>(
  State(state): State<AppState<S, C, U>>,
  Path(id): Path<String>,
  Query(params): Query<ReportParams>,
) -> Result<Json<Report>, ApiError>
where
  S: ReportStore + 'static,
  C: FastCache + 'static,
  U: Upstream + 'static,
{
  let kind: SubjectKind = params.kind.as_deref().unwrap_or_default().parse()?;
  let orchestrator = state.orchestrator.clone();
  let report = tokio::spawn(async move { orchestrator.fetch_report(&id, kind).await }).await??;
  Ok(Json(report))
}

// ─── Stored views ────────────────────────────────────────────────────────────

/// `GET /domains/{id}`
pub async fn domain<S, C, U>(
  State(state): State<AppState<S, C, U>>,
  Path(id): Path<String>,
) -> Result<Json<DomainView>, ApiError>
where
  S: ReportStore + 'static,
  C: FastCache + 'static,
  U: Upstream + 'static,
{
  let id = validate_identifier(&id)?;
  let view = state
    .orchestrator
    .store()
    .domain_view(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("domain {id} not found")))?;
  Ok(Json(view))
}

/// `GET /ip_addresses/{id}`
pub async fn ip_address<S, C, U>(
  State(state): State<AppState<S, C, U>>,
  Path(id): Path<String>,
) -> Result<Json<IpView>, ApiError>
where
  S: ReportStore + 'static,
  C: FastCache + 'static,
  U: Upstream + 'static,
{
  let id = validate_identifier(&id)?;
  let view = state
    .orchestrator
    .store()
    .ip_view(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("ip address {id} not found")))?;
  Ok(Json(view))
}
