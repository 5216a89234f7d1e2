//! Router tests against an in-memory store and a gated refresh runner.

use std::{sync::Arc, time::Duration};

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use chrono::{Days, Utc};
use opsintel_core::{
  frame::Frame,
  record::{Anomaly, Category, DetectionMethod, Insight, InsightRule, RunStamp, Severity},
  refresh::{RefreshRequest, RefreshRunner, RefreshSnapshot, RefreshState, RefreshStatus},
  store::MetricStore,
  table::{Column, FactTable},
};
use opsintel_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tokio::sync::Notify;
use tower::ServiceExt as _;

use crate::{AppState, router};

// ─── Fixtures ────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct RunError(String);

/// Holds each run until the gate opens.
#[derive(Default)]
struct GatedRunner {
  gate: Notify,
  fail: bool,
}

impl RefreshRunner for GatedRunner {
  type Error = RunError;

  async fn run(&self, _request: RefreshRequest, state: &RefreshState) -> Result<String, RunError> {
    state.set_message("Running ETL pipeline...");
    self.gate.notified().await;
    if self.fail {
      Err(RunError("source unavailable".to_owned()))
    } else {
      Ok("Data refresh completed successfully".to_owned())
    }
  }
}

/// Dies before reporting any progress.
struct PanickingRunner;

impl RefreshRunner for PanickingRunner {
  type Error = RunError;

  async fn run(&self, _request: RefreshRequest, _state: &RefreshState) -> Result<String, RunError> {
    panic!("stage table vanished");
  }
}

async fn make_state<R: RefreshRunner>(runner: R) -> AppState<SqliteStore, R> {
  let store = SqliteStore::open_in_memory().await.unwrap();
  AppState::new(Arc::new(store), Arc::new(runner))
}

fn app<R: RefreshRunner + 'static>(state: &AppState<SqliteStore, R>) -> Router {
  router(state.clone())
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let builder = Request::builder().method(method).uri(uri);
  let req = match body {
    Some(json) => builder
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(json.to_string()))
      .unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };
  let resp = app.oneshot(req).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
  (status, value)
}

async fn settled(state: &RefreshState) -> RefreshSnapshot {
  for _ in 0..400 {
    let snap = state.snapshot();
    if snap.status != RefreshStatus::Running {
      return snap;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  panic!("refresh never finished");
}

// ─── Service ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn index_lists_endpoints() {
  let state = make_state(GatedRunner::default()).await;
  let (status, body) = send(app(&state), "GET", "/", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["endpoints"]["refresh"], "/refresh (POST)");
}

#[tokio::test]
async fn health_reports_connected() {
  let state = make_state(GatedRunner::default()).await;
  let (status, body) = send(app(&state), "GET", "/health", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn status_counts_fact_rows() {
  let state = make_state(GatedRunner::default()).await;
  let mut frame = Frame::new(vec![Column::Date, Column::Revenue]);
  frame.push(vec!["2024-01-31".into(), 1.0.into()]).unwrap();
  frame.push(vec!["2024-02-29".into(), 2.0.into()]).unwrap();
  state.store.replace_table(FactTable::Finance, frame).await.unwrap();

  let (status, body) = send(app(&state), "GET", "/status", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "idle");
  assert_eq!(body["last_refresh"], Value::Null);
  assert_eq!(body["database_records"]["finance"], 2);
  assert_eq!(body["database_records"]["it_tickets"], 0);
}

// ─── Refresh ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn concurrent_refresh_is_rejected_without_touching_state() {
  let state = make_state(GatedRunner::default()).await;

  let (status, body) = send(app(&state), "POST", "/refresh", Some(json!({}))).await;
  assert_eq!(status, StatusCode::ACCEPTED);
  assert_eq!(body["check_status_at"], "/status");

  // Let the spawned task reach the gate.
  while state.refresh.snapshot().message != "Running ETL pipeline..." {
    tokio::task::yield_now().await;
  }
  let before = state.refresh.snapshot();
  assert_eq!(before.status, RefreshStatus::Running);

  let (status, body) = send(
    app(&state),
    "POST",
    "/refresh",
    Some(json!({ "regenerate_data": true })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body, json!({ "status": "error", "message": "Refresh already in progress" }));
  assert_eq!(state.refresh.snapshot(), before);

  state.runner.gate.notify_one();
  let after = settled(&state.refresh).await;
  assert_eq!(after.status, RefreshStatus::Completed);
  assert_eq!(after.message, "Data refresh completed successfully");
  assert!(after.last_refresh.is_some());
}

#[tokio::test]
async fn failed_refresh_reports_message() {
  let state = make_state(GatedRunner { fail: true, ..Default::default() }).await;
  state.runner.gate.notify_one();

  let (status, _) = send(app(&state), "POST", "/refresh", Some(json!({}))).await;
  assert_eq!(status, StatusCode::ACCEPTED);

  let after = settled(&state.refresh).await;
  assert_eq!(after.status, RefreshStatus::Failed);
  assert_eq!(after.message, "Error during refresh: source unavailable");
  assert_eq!(after.last_refresh, None);

  // A failed refresh does not block the next one.
  let (status, _) = send(app(&state), "POST", "/refresh", Some(json!({}))).await;
  assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn panicking_refresh_is_marked_failed() {
  let state = make_state(PanickingRunner).await;

  let (status, _) = send(app(&state), "POST", "/refresh", Some(json!({}))).await;
  assert_eq!(status, StatusCode::ACCEPTED);

  let after = settled(&state.refresh).await;
  assert_eq!(after.status, RefreshStatus::Failed);
  assert!(after.message.starts_with("Error during refresh: "), "{}", after.message);

  let (status, _) = send(app(&state), "POST", "/refresh", Some(json!({}))).await;
  assert_eq!(status, StatusCode::ACCEPTED);
}

// ─── Reads ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn metrics_returns_latest_rows() {
  let state = make_state(GatedRunner::default()).await;
  let mut frame = Frame::new(vec![Column::Date, Column::Revenue]);
  frame.push(vec!["2024-01-31".into(), 1.0.into()]).unwrap();
  frame.push(vec!["2024-02-29".into(), 2.0.into()]).unwrap();
  state.store.replace_table(FactTable::Finance, frame).await.unwrap();

  let (status, body) = send(app(&state), "GET", "/metrics", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["finance"]["date"], "2024-02-29");
  assert_eq!(body["finance"]["revenue"], 2.0);
  assert_eq!(body["finance"]["profit"], Value::Null);
  assert_eq!(body["hr"], json!({}));
}

#[tokio::test]
async fn latest_insights_honours_limit() {
  let state = make_state(GatedRunner::default()).await;
  let today = Utc::now().date_naive();
  for rule in [InsightRule::RevenueGrowth, InsightRule::ProfitMargin, InsightRule::Turnover] {
    let insight = Insight {
      date: today,
      category: Category::Finance,
      rule,
      insight_text: format!("{rule}"),
      severity: Severity::Info,
      metric_value: Some(1.0),
    };
    state.store.record_insight(&insight, RunStamp::now()).await.unwrap();
  }

  let (_, body) = send(app(&state), "GET", "/insights/latest?limit=2", None).await;
  assert_eq!(body["count"], 2);

  let (_, body) = send(app(&state), "GET", "/insights/latest", None).await;
  assert_eq!(body["count"], 3);
}

#[tokio::test]
async fn recent_anomalies_use_wall_clock_window() {
  let state = make_state(GatedRunner::default()).await;
  let today = Utc::now().date_naive();
  for date in [today, today.checked_sub_days(Days::new(90)).unwrap()] {
    let anomaly = Anomaly {
      date,
      metric_name: "Revenue".to_owned(),
      table_name: FactTable::Finance,
      column: Column::Revenue,
      metric_value: 10.0,
      expected_value: Some(5.0),
      anomaly_score: 3.2,
      detection_method: DetectionMethod::ZScore,
    };
    state.store.record_anomaly(&anomaly, RunStamp::now()).await.unwrap();
  }

  let (status, body) = send(app(&state), "GET", "/anomalies/recent?days=30", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["count"], 1);
  assert_eq!(body["period_days"], 30);
  assert_eq!(body["anomalies"][0]["detection_method"], "z-score");

  let (_, body) = send(app(&state), "GET", "/anomalies/recent?days=120", None).await;
  assert_eq!(body["count"], 2);
}

#[tokio::test]
async fn forecasts_require_metric() {
  let state = make_state(GatedRunner::default()).await;
  let (status, _) = send(app(&state), "GET", "/forecasts", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, body) = send(app(&state), "GET", "/forecasts?metric=Revenue", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["count"], 0);
}
