//! Handler for `POST /refresh`.
//!
//! At most one refresh runs at a time. A trigger while one is running gets
//! 409 and leaves the refresh state untouched; otherwise the pipeline runs on
//! a spawned task and the caller polls `/status`. A runner that panics is
//! reported as a failed refresh.

use axum::{Json, extract::State, http::StatusCode};
use opsintel_core::{
  refresh::{RefreshRequest, RefreshRunner},
  store::MetricStore,
};
use serde_json::{Value, json};
use tracing::{error, info};

use crate::AppState;

/// `POST /refresh`, body: `{"regenerate_data":false,"run_forecasting":true,...}`
pub async fn trigger<S, R>(
  State(state): State<AppState<S, R>>,
  Json(request): Json<RefreshRequest>,
) -> (StatusCode, Json<Value>)
where
  S: MetricStore + 'static,
  R: RefreshRunner + 'static,
{
  if let Err(conflict) = state.refresh.try_begin("Starting data refresh...") {
    return (
      StatusCode::CONFLICT,
      Json(json!({ "status": "error", "message": conflict.to_string() })),
    );
  }

  info!(?request, "refresh accepted");
  let task = state.clone();
  tokio::spawn(async move {
    // The inner task isolates panics so the state always leaves `Running`.
    let run = task.clone();
    let joined =
      tokio::spawn(async move { run.runner.run(request, &run.refresh).await }).await;
    match joined {
      Ok(Ok(message)) => {
        info!("refresh completed");
        task.refresh.complete(message);
      }
      Ok(Err(e)) => {
        error!(error = %e, "refresh failed");
        task.refresh.fail(format!("Error during refresh: {e}"));
      }
      Err(e) => {
        error!(error = %e, "refresh task aborted");
        task.refresh.fail(format!("Error during refresh: {e}"));
      }
    }
  });

  (
    StatusCode::ACCEPTED,
    Json(json!({
      "status": "accepted",
      "message": "Data refresh started in background",
      "check_status_at": "/status"
    })),
  )
}
