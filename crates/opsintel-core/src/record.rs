//! Rows of the derived tables: anomalies, insights and forecasts.
//!
//! Derived rows are written only by the engine that owns the table and are
//! keyed on a natural key, so a re-run replaces the previous run's row instead
//! of duplicating it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::table::{Column, FactTable};

// ─── Insight classification ──────────────────────────────────────────────────

/// Insight urgency tier.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  EnumIter,
  EnumString,
  IntoStaticStr,
  strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
  Info,
  Warning,
  Critical,
}

impl Severity {
  pub fn as_str(self) -> &'static str { self.into() }
}

/// Business domain an insight belongs to.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  EnumIter,
  EnumString,
  IntoStaticStr,
  strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Category {
  Finance,
  Sales,
  Operations,
  Hr,
  It,
}

impl Category {
  pub fn as_str(self) -> &'static str { self.into() }
}

/// The threshold rule that produced an insight. Part of the insight's
/// natural key: one row per `(date, category, rule)`.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  EnumString,
  IntoStaticStr,
  strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InsightRule {
  RevenueGrowth,
  ProfitMargin,
  BestRegion,
  UnderperformingRegion,
  OntimeDelivery,
  ProcessingTime,
  Turnover,
  Headcount,
  CriticalResolution,
  TicketBacklog,
}

impl InsightRule {
  pub fn as_str(self) -> &'static str { self.into() }
}

/// A generated narrative recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
  pub date:         NaiveDate,
  pub category:     Category,
  pub rule:         InsightRule,
  pub insight_text: String,
  pub severity:     Severity,
  pub metric_value: Option<f64>,
}

// ─── Anomalies ───────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  EnumString,
  IntoStaticStr,
  strum::Display,
)]
pub enum DetectionMethod {
  #[default]
  #[serde(rename = "z-score")]
  #[strum(serialize = "z-score")]
  ZScore,
  #[serde(rename = "isolation_forest")]
  #[strum(serialize = "isolation_forest")]
  IsolationForest,
}

impl DetectionMethod {
  pub fn as_str(self) -> &'static str { self.into() }
}

/// One flagged observation of a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
  pub date:             NaiveDate,
  /// Display name, e.g. `"On-Time Delivery"`.
  pub metric_name:      String,
  pub table_name:       FactTable,
  pub column:           Column,
  pub metric_value:     f64,
  /// Series mean for the z-score method; absent for the forest.
  pub expected_value:   Option<f64>,
  pub anomaly_score:    f64,
  pub detection_method: DetectionMethod,
}

/// An anomaly row as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnomaly {
  pub date:             NaiveDate,
  pub metric_name:      String,
  pub metric_value:     f64,
  pub expected_value:   Option<f64>,
  pub anomaly_score:    f64,
  pub detection_method: DetectionMethod,
  pub run_id:           Uuid,
  pub created_at:       DateTime<Utc>,
}

// ─── Forecasts ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
  pub date:           NaiveDate,
  pub forecast_value: f64,
  pub lower_bound:    f64,
  pub upper_bound:    f64,
}

/// A persisted future-dated forecast row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
  pub metric_name: String,
  pub model_used:  String,
  #[serde(flatten)]
  pub point:       ForecastPoint,
}

/// In-sample accuracy of a fitted model, rounded to two decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
  pub rmse: f64,
  pub mae:  f64,
  pub mape: f64,
}

// ─── Write envelope ──────────────────────────────────────────────────────────

/// Provenance stamped on every derived row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStamp {
  pub run_id:     Uuid,
  pub created_at: DateTime<Utc>,
}

impl RunStamp {
  pub fn now() -> Self { Self { run_id: Uuid::new_v4(), created_at: Utc::now() } }
}
