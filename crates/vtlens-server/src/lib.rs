//! HTTP front end and report orchestration for vtlens.
//!
//! Exposes an axum [`Router`] over an [`Orchestrator`] generic in its store,
//! fast cache and upstream, so tests can substitute any of them.

pub mod error;
pub mod handlers;
pub mod orchestrator;
pub mod settings;

#[cfg(test)]
mod testing;

pub use error::ApiError;
pub use orchestrator::{Orchestrator, Policy};
pub use settings::{ConfigError, ServerConfig};

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;
use vtlens_core::{cache::FastCache, store::ReportStore, upstream::Upstream};

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S, C, U> {
  pub orchestrator: Arc<Orchestrator<S, C, U>>,
}

impl<S, C, U> AppState<S, C, U> {
  pub fn new(orchestrator: Orchestrator<S, C, U>) -> Self {
    Self { orchestrator: Arc::new(orchestrator) }
  }
}

impl<S, C, U> Clone for AppState<S, C, U> {
  fn clone(&self) -> Self { Self { orchestrator: self.orchestrator.clone() } }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the vtlens API router.
pub fn router<S, C, U>(state: AppState<S, C, U>) -> Router
where
  S: ReportStore + 'static,
  C: FastCache + 'static,
  U: Upstream + 'static,
{
  Router::new()
    .route("/report/{id}",       get(handlers::report::<S, C, U>))
    .route("/domains/{id}",      get(handlers::domain::<S, C, U>))
    .route("/ip_addresses/{id}", get(handlers::ip_address::<S, C, U>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ───────────────────────────────────────────────────────
