//! JSON REST API for OpsIntel.
//!
//! Exposes an axum [`Router`] backed by any [`MetricStore`] and a
//! [`RefreshRunner`]. Transport and TLS are the caller's responsibility.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/` | Service index |
//! | `GET`  | `/health` | 503 when the store is unreachable |
//! | `GET`  | `/status` | Refresh state and fact-table row counts |
//! | `POST` | `/refresh` | 202 accepted, 409 while a refresh runs |
//! | `GET`  | `/metrics` | Latest finance, operations and HR rows |
//! | `GET`  | `/insights/latest` | `?limit=10` |
//! | `GET`  | `/anomalies/recent` | `?days=30` |
//! | `GET`  | `/forecasts` | `?metric=Revenue` |

pub mod error;
pub mod read;
pub mod refresh;
pub mod status;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use opsintel_core::{
  refresh::{RefreshRunner, RefreshState},
  store::MetricStore,
};

pub use error::ApiError;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S, R> {
  pub store:   Arc<S>,
  pub refresh: Arc<RefreshState>,
  pub runner:  Arc<R>,
}

impl<S, R> Clone for AppState<S, R> {
  fn clone(&self) -> Self {
    Self {
      store:   self.store.clone(),
      refresh: self.refresh.clone(),
      runner:  self.runner.clone(),
    }
  }
}

impl<S, R> AppState<S, R> {
  pub fn new(store: Arc<S>, runner: Arc<R>) -> Self {
    Self { store, refresh: Arc::new(RefreshState::new()), runner }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
pub fn router<S, R>(state: AppState<S, R>) -> Router<()>
where
  S: MetricStore + 'static,
  R: RefreshRunner + 'static,
{
  Router::new()
    .route("/", get(status::index))
    .route("/health", get(status::health::<S, R>))
    .route("/status", get(status::status::<S, R>))
    .route("/refresh", post(refresh::trigger::<S, R>))
    .route("/metrics", get(read::metrics::<S, R>))
    .route("/insights/latest", get(read::latest_insights::<S, R>))
    .route("/anomalies/recent", get(read::recent_anomalies::<S, R>))
    .route("/forecasts", get(read::forecasts::<S, R>))
    .with_state(state)
}

#[cfg(test)]
mod tests;
