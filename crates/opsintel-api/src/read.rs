//! Read-only handlers over fact and derived tables.

use axum::{
  Json,
  extract::{Query, State},
};
use chrono::{Days, NaiveDate, Utc};
use opsintel_core::{
  frame::Frame,
  record::{ForecastRow, Insight, StoredAnomaly},
  refresh::RefreshRunner,
  store::{FetchQuery, MetricStore},
  table::{Column, FactTable},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{AppState, error::ApiError};

// ─── Metrics ─────────────────────────────────────────────────────────────────

/// Columns served by `/metrics`, per table.
const LATEST: [(FactTable, &[Column]); 3] = [
  (FactTable::Finance, &[
    Column::Date,
    Column::Revenue,
    Column::Profit,
    Column::ProfitMarginPct,
  ]),
  (FactTable::Operations, &[
    Column::Date,
    Column::OntimeDeliveryPct,
    Column::AvgProcessingTimeHours,
  ]),
  (FactTable::Hr, &[Column::Date, Column::EmployeeCount, Column::TurnoverRatePct]),
];

/// First row of `frame` as a JSON object; empty when there is none.
fn first_row(frame: &Frame) -> Map<String, Value> {
  let mut out = Map::new();
  if let Some(row) = frame.rows.first() {
    for (column, cell) in frame.columns.iter().zip(row) {
      out.insert(column.as_str().to_owned(), json!(cell));
    }
  }
  out
}

/// `GET /metrics`
pub async fn metrics<S, R>(State(state): State<AppState<S, R>>) -> Result<Json<Value>, ApiError>
where
  S: MetricStore,
  R: RefreshRunner,
{
  let mut body = Map::new();
  body.insert("timestamp".to_owned(), json!(Utc::now()));
  for (table, columns) in LATEST {
    let query = FetchQuery::new(table, columns)
      .map_err(|e| ApiError::BadRequest(e.to_string()))?
      .latest(1);
    let frame = state.store.fetch(&query).await.map_err(ApiError::store)?;
    body.insert(table.as_str().to_owned(), Value::Object(first_row(&frame)));
  }
  Ok(Json(Value::Object(body)))
}

// ─── Insights ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LimitParams {
  #[serde(default = "default_limit")]
  pub limit: usize,
}

fn default_limit() -> usize { 10 }

#[derive(Debug, Serialize)]
pub struct InsightsResponse {
  pub count:    usize,
  pub insights: Vec<Insight>,
}

/// `GET /insights/latest[?limit=10]`
pub async fn latest_insights<S, R>(
  State(state): State<AppState<S, R>>,
  Query(params): Query<LimitParams>,
) -> Result<Json<InsightsResponse>, ApiError>
where
  S: MetricStore,
  R: RefreshRunner,
{
  let insights = state
    .store
    .latest_insights(params.limit)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(InsightsResponse { count: insights.len(), insights }))
}

// ─── Anomalies ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DaysParams {
  #[serde(default = "default_days")]
  pub days: u64,
}

fn default_days() -> u64 { 30 }

#[derive(Debug, Serialize)]
pub struct AnomaliesResponse {
  pub count:       usize,
  pub period_days: u64,
  pub anomalies:   Vec<StoredAnomaly>,
}

/// `GET /anomalies/recent[?days=30]`
pub async fn recent_anomalies<S, R>(
  State(state): State<AppState<S, R>>,
  Query(params): Query<DaysParams>,
) -> Result<Json<AnomaliesResponse>, ApiError>
where
  S: MetricStore,
  R: RefreshRunner,
{
  let since = Utc::now()
    .date_naive()
    .checked_sub_days(Days::new(params.days))
    .unwrap_or(NaiveDate::MIN);
  let anomalies = state
    .store
    .recent_anomalies(since)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(AnomaliesResponse {
    count: anomalies.len(),
    period_days: params.days,
    anomalies,
  }))
}

// ─── Forecasts ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MetricParams {
  pub metric: String,
}

#[derive(Debug, Serialize)]
pub struct ForecastsResponse {
  pub metric:    String,
  pub count:     usize,
  pub forecasts: Vec<ForecastRow>,
}

/// `GET /forecasts?metric=<display name>`
pub async fn forecasts<S, R>(
  State(state): State<AppState<S, R>>,
  Query(params): Query<MetricParams>,
) -> Result<Json<ForecastsResponse>, ApiError>
where
  S: MetricStore,
  R: RefreshRunner,
{
  let metric = params.metric.trim();
  if metric.is_empty() {
    return Err(ApiError::BadRequest("metric must not be empty".to_owned()));
  }
  let forecasts = state.store.forecasts(metric).await.map_err(ApiError::store)?;
  Ok(Json(ForecastsResponse { metric: metric.to_owned(), count: forecasts.len(), forecasts }))
}
