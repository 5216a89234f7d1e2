//! The `MetricStore` trait and supporting query types.
//!
//! The trait is the storage gateway: implemented by backends (e.g.
//! `opsintel-store-sqlite`) and consumed by the ETL orchestrator, the engines
//! and the API. All hand-off between stages goes through it.

use std::future::Future;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
  Result,
  frame::Frame,
  record::{Anomaly, ForecastPoint, ForecastRow, Insight, RunStamp, StoredAnomaly},
  table::{Column, FactTable},
};

// ─── Query type ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DateOrder {
  #[default]
  Ascending,
  Descending,
}

/// Parameters for [`MetricStore::fetch`]. Built only through
/// [`FetchQuery::new`], which validates every column against the table.
#[derive(Debug, Clone)]
pub struct FetchQuery {
  table:        FactTable,
  columns:      Vec<Column>,
  pub order:    DateOrder,
  /// Keep at most this many rows after ordering.
  pub limit:    Option<usize>,
  /// Keep rows with `date >= since`.
  pub since:    Option<NaiveDate>,
  non_null:     Vec<Column>,
}

impl FetchQuery {
  pub fn new(table: FactTable, columns: &[Column]) -> Result<Self> {
    for c in columns {
      table.check_column(*c)?;
    }
    Ok(Self {
      table,
      columns: columns.to_vec(),
      order: DateOrder::Ascending,
      limit: None,
      since: None,
      non_null: Vec::new(),
    })
  }

  /// The `n` most recent rows, newest first.
  pub fn latest(mut self, n: usize) -> Self {
    self.order = DateOrder::Descending;
    self.limit = Some(n);
    self
  }

  pub fn since(mut self, date: NaiveDate) -> Self {
    self.since = Some(date);
    self
  }

  /// Drop rows where `column` is NULL.
  pub fn non_null(mut self, column: Column) -> Result<Self> {
    self.table.check_column(column)?;
    self.non_null.push(column);
    Ok(self)
  }

  pub fn table(&self) -> FactTable { self.table }

  pub fn columns(&self) -> &[Column] { &self.columns }

  pub fn non_null_columns(&self) -> &[Column] { &self.non_null }
}

/// Data-quality facts about a loaded fact table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
  pub row_count:    usize,
  pub min_date:     Option<String>,
  pub max_date:     Option<String>,
  pub null_dates:   usize,
  pub column_count: usize,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the relational store backing the pipeline.
///
/// Fact tables are replaced wholesale; derived tables are written through
/// upserts keyed on their natural key. All methods return `Send` futures so
/// the trait can be used from spawned tokio tasks.
pub trait MetricStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Cheap liveness probe.
  fn ping(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Schema ────────────────────────────────────────────────────────────

  /// Execute a DDL script. A malformed script is an error.
  fn run_schema_script(
    &self,
    ddl: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Fact tables ───────────────────────────────────────────────────────

  /// Atomically replace `table` with the rows of `frame`. Either every row
  /// lands or the previous contents survive. Returns the row count written.
  fn replace_table(
    &self,
    table: FactTable,
    frame: Frame,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn fetch<'a>(
    &'a self,
    query: &'a FetchQuery,
  ) -> impl Future<Output = Result<Frame, Self::Error>> + Send + 'a;

  fn table_stats(
    &self,
    table: FactTable,
  ) -> impl Future<Output = Result<TableStats, Self::Error>> + Send + '_;

  // ── Derived tables: upserts ───────────────────────────────────────────

  fn record_anomaly<'a>(
    &'a self,
    anomaly: &'a Anomaly,
    stamp: RunStamp,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn record_insight<'a>(
    &'a self,
    insight: &'a Insight,
    stamp: RunStamp,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn record_forecast<'a>(
    &'a self,
    metric_name: &'a str,
    model_used: &'a str,
    point: &'a ForecastPoint,
    stamp: RunStamp,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Derived tables: reads ─────────────────────────────────────────────

  /// Anomalies dated on or after `since`, newest first, then by score.
  fn recent_anomalies(
    &self,
    since: NaiveDate,
  ) -> impl Future<Output = Result<Vec<StoredAnomaly>, Self::Error>> + Send + '_;

  /// The most recently written insights.
  fn latest_insights(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Insight>, Self::Error>> + Send + '_;

  /// Stored forecast rows for a metric display name, in date order.
  fn forecasts<'a>(
    &'a self,
    metric_name: &'a str,
  ) -> impl Future<Output = Result<Vec<ForecastRow>, Self::Error>> + Send + 'a;
}
