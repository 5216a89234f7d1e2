//! Handlers for `/`, `/health` and `/status`.

use std::collections::BTreeMap;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use opsintel_core::{
  refresh::{RefreshRunner, RefreshSnapshot},
  store::MetricStore,
  table::FactTable,
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::{AppState, error::ApiError};

/// `GET /`
pub async fn index() -> Json<Value> {
  Json(json!({
    "message": "OpsIntel API",
    "version": env!("CARGO_PKG_VERSION"),
    "endpoints": {
      "status": "/status",
      "refresh": "/refresh (POST)",
      "metrics": "/metrics",
      "insights": "/insights/latest",
      "anomalies": "/anomalies/recent",
      "forecasts": "/forecasts",
      "health": "/health"
    }
  }))
}

/// `GET /health`
pub async fn health<S, R>(State(state): State<AppState<S, R>>) -> impl IntoResponse
where
  S: MetricStore,
  R: RefreshRunner,
{
  match state.store.ping().await {
    Ok(()) => (
      StatusCode::OK,
      Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "database": "connected"
      })),
    ),
    Err(e) => (
      StatusCode::SERVICE_UNAVAILABLE,
      Json(json!({ "error": format!("Service unhealthy: {e}") })),
    ),
  }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
  #[serde(flatten)]
  pub refresh:          RefreshSnapshot,
  pub database_records: BTreeMap<FactTable, usize>,
}

/// `GET /status`
pub async fn status<S, R>(
  State(state): State<AppState<S, R>>,
) -> Result<Json<StatusResponse>, ApiError>
where
  S: MetricStore,
  R: RefreshRunner,
{
  let refresh = state.refresh.snapshot();
  let mut database_records = BTreeMap::new();
  for table in FactTable::ALL {
    let stats = state.store.table_stats(table).await.map_err(ApiError::store)?;
    database_records.insert(table, stats.row_count);
  }
  Ok(Json(StatusResponse { refresh, database_records }))
}
