//! [`SqliteStore`]: the SQLite implementation of [`MetricStore`].

use std::path::Path;

use chrono::NaiveDate;
use rusqlite::types::Value as SqlValue;
use tracing::debug;

use opsintel_core::{
  frame::Frame,
  record::{Anomaly, ForecastPoint, ForecastRow, Insight, RunStamp, StoredAnomaly},
  store::{DateOrder, FetchQuery, MetricStore, TableStats},
  table::FactTable,
};

use crate::{
  Result,
  encode::{
    RawAnomaly, RawForecast, RawInsight, decode_value, encode_date, encode_dt,
    encode_uuid, encode_value,
  },
  schema::{create_fact_table, default_schema},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An OpsIntel metric store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and create any missing tables.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    let ddl = default_schema();
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&ddl)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// `SELECT` text for a validated query. Every identifier comes from the
/// closed table/column enums; only values travel as parameters.
fn select_sql(query: &FetchQuery) -> (String, Vec<SqlValue>) {
  let cols = query
    .columns()
    .iter()
    .map(|c| c.as_str())
    .collect::<Vec<_>>()
    .join(", ");

  let mut conds: Vec<String> = query
    .non_null_columns()
    .iter()
    .map(|c| format!("{} IS NOT NULL", c.as_str()))
    .collect();
  let mut params = Vec::new();
  if let Some(since) = query.since {
    conds.push("date >= ?".to_owned());
    params.push(SqlValue::Text(encode_date(since)));
  }

  let where_clause = if conds.is_empty() {
    String::new()
  } else {
    format!(" WHERE {}", conds.join(" AND "))
  };
  let dir = match query.order {
    DateOrder::Ascending => "ASC",
    DateOrder::Descending => "DESC",
  };
  let mut sql = format!(
    "SELECT {cols} FROM {}{where_clause} ORDER BY date {dir}, rowid {dir}",
    query.table().as_str()
  );
  if let Some(limit) = query.limit {
    sql.push_str(" LIMIT ?");
    params.push(SqlValue::Integer(limit as i64));
  }
  (sql, params)
}

// ─── MetricStore impl ────────────────────────────────────────────────────────

impl MetricStore for SqliteStore {
  type Error = crate::Error;

  async fn ping(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Schema ────────────────────────────────────────────────────────────────

  async fn run_schema_script(&self, ddl: String) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&ddl)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Fact tables ───────────────────────────────────────────────────────────

  async fn replace_table(&self, table: FactTable, frame: Frame) -> Result<usize> {
    for column in &frame.columns {
      table.check_column(*column)?;
    }

    let create = create_fact_table(table, false);
    let drop = format!("DROP TABLE IF EXISTS {}", table.as_str());
    let cols = frame
      .columns
      .iter()
      .map(|c| c.as_str())
      .collect::<Vec<_>>()
      .join(", ");
    let marks = vec!["?"; frame.columns.len()].join(", ");
    let insert = format!("INSERT INTO {} ({cols}) VALUES ({marks})", table.as_str());
    let rows = frame.rows;

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(&drop, [])?;
        tx.execute_batch(&create)?;
        let mut count: usize = 0;
        {
          let mut stmt = tx.prepare(&insert)?;
          for row in rows {
            stmt.execute(rusqlite::params_from_iter(row.into_iter().map(encode_value)))?;
            count += 1;
          }
        }
        tx.commit()?;
        Ok(count)
      })
      .await?;

    debug!(table = %table, rows = written, "replaced fact table");
    Ok(written)
  }

  async fn fetch(&self, query: &FetchQuery) -> Result<Frame> {
    let (sql, params) = select_sql(query);
    let columns = query.columns().to_vec();
    let width = columns.len();

    let rows: Vec<Vec<SqlValue>> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), |row| {
            (0..width)
              .map(|i| row.get::<_, SqlValue>(i))
              .collect::<rusqlite::Result<Vec<_>>>()
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut frame = Frame::new(columns);
    for row in rows {
      frame.push(row.into_iter().map(decode_value).collect())?;
    }
    Ok(frame)
  }

  async fn table_stats(&self, table: FactTable) -> Result<TableStats> {
    let stats_sql = format!(
      "SELECT COUNT(*), MIN(date), MAX(date), COALESCE(SUM(date IS NULL), 0) FROM {}",
      table.as_str()
    );
    let info_sql = format!("SELECT COUNT(*) FROM pragma_table_info('{}')", table.as_str());

    let stats = self
      .conn
      .call(move |conn| {
        let (row_count, min_date, max_date, null_dates): (i64, Option<String>, Option<String>, i64) =
          conn.query_row(&stats_sql, [], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
          })?;
        let column_count: i64 = conn.query_row(&info_sql, [], |r| r.get(0))?;
        Ok(TableStats {
          row_count: row_count as usize,
          min_date,
          max_date,
          null_dates: null_dates as usize,
          column_count: column_count as usize,
        })
      })
      .await?;
    Ok(stats)
  }

  // ── Derived tables: upserts ───────────────────────────────────────────────

  async fn record_anomaly(&self, anomaly: &Anomaly, stamp: RunStamp) -> Result<()> {
    let date_str     = encode_date(anomaly.date);
    let metric_name  = anomaly.metric_name.clone();
    let value        = anomaly.metric_value;
    let expected     = anomaly.expected_value;
    let score        = anomaly.anomaly_score;
    let method_str   = anomaly.detection_method.as_str();
    let table_str    = anomaly.table_name.as_str();
    let run_id_str   = encode_uuid(stamp.run_id);
    let created_str  = encode_dt(stamp.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO anomalies
             (date, metric_name, metric_value, expected_value, anomaly_score,
              detection_method, table_name, run_id, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
           ON CONFLICT (date, metric_name, detection_method) DO UPDATE SET
             metric_value   = excluded.metric_value,
             expected_value = excluded.expected_value,
             anomaly_score  = excluded.anomaly_score,
             table_name     = excluded.table_name,
             run_id         = excluded.run_id,
             created_at     = excluded.created_at",
          rusqlite::params![
            date_str,
            metric_name,
            value,
            expected,
            score,
            method_str,
            table_str,
            run_id_str,
            created_str
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn record_insight(&self, insight: &Insight, stamp: RunStamp) -> Result<()> {
    let date_str     = encode_date(insight.date);
    let category_str = insight.category.as_str();
    let rule_str     = insight.rule.as_str();
    let text         = insight.insight_text.clone();
    let severity_str = insight.severity.as_str();
    let value        = insight.metric_value;
    let run_id_str   = encode_uuid(stamp.run_id);
    let created_str  = encode_dt(stamp.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO insights
             (date, category, rule, insight_text, severity, metric_value, run_id, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
           ON CONFLICT (date, category, rule) DO UPDATE SET
             insight_text = excluded.insight_text,
             severity     = excluded.severity,
             metric_value = excluded.metric_value,
             run_id       = excluded.run_id,
             created_at   = excluded.created_at",
          rusqlite::params![
            date_str,
            category_str,
            rule_str,
            text,
            severity_str,
            value,
            run_id_str,
            created_str
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn record_forecast(
    &self,
    metric_name: &str,
    model_used: &str,
    point: &ForecastPoint,
    stamp: RunStamp,
  ) -> Result<()> {
    let date_str    = encode_date(point.date);
    let metric_name = metric_name.to_owned();
    let model_used  = model_used.to_owned();
    let (value, lower, upper) = (point.forecast_value, point.lower_bound, point.upper_bound);
    let run_id_str  = encode_uuid(stamp.run_id);
    let created_str = encode_dt(stamp.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO forecasts
             (date, forecast_value, lower_bound, upper_bound, metric_name, model_used,
              run_id, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
           ON CONFLICT (date, metric_name, model_used) DO UPDATE SET
             forecast_value = excluded.forecast_value,
             lower_bound    = excluded.lower_bound,
             upper_bound    = excluded.upper_bound,
             run_id         = excluded.run_id,
             created_at     = excluded.created_at",
          rusqlite::params![
            date_str,
            value,
            lower,
            upper,
            metric_name,
            model_used,
            run_id_str,
            created_str
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Derived tables: reads ─────────────────────────────────────────────────

  async fn recent_anomalies(&self, since: NaiveDate) -> Result<Vec<StoredAnomaly>> {
    let since_str = encode_date(since);

    let raws: Vec<RawAnomaly> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT date, metric_name, metric_value, expected_value, anomaly_score,
                  detection_method, run_id, created_at
           FROM anomalies
           WHERE date >= ?1
           ORDER BY date DESC, anomaly_score DESC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![since_str], |r| {
            Ok(RawAnomaly {
              date:             r.get(0)?,
              metric_name:      r.get(1)?,
              metric_value:     r.get(2)?,
              expected_value:   r.get(3)?,
              anomaly_score:    r.get(4)?,
              detection_method: r.get(5)?,
              run_id:           r.get(6)?,
              created_at:       r.get(7)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAnomaly::into_anomaly).collect()
  }

  async fn latest_insights(&self, limit: usize) -> Result<Vec<Insight>> {
    let limit_val = limit as i64;

    let raws: Vec<RawInsight> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT date, category, rule, insight_text, severity, metric_value
           FROM insights
           ORDER BY created_at DESC, insight_id DESC
           LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit_val], |r| {
            Ok(RawInsight {
              date:         r.get(0)?,
              category:     r.get(1)?,
              rule:         r.get(2)?,
              insight_text: r.get(3)?,
              severity:     r.get(4)?,
              metric_value: r.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawInsight::into_insight).collect()
  }

  async fn forecasts(&self, metric_name: &str) -> Result<Vec<ForecastRow>> {
    let metric = metric_name.to_owned();

    let raws: Vec<RawForecast> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT date, forecast_value, lower_bound, upper_bound, metric_name, model_used
           FROM forecasts
           WHERE metric_name = ?1
           ORDER BY date ASC, model_used ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![metric], |r| {
            Ok(RawForecast {
              date:           r.get(0)?,
              forecast_value: r.get(1)?,
              lower_bound:    r.get(2)?,
              upper_bound:    r.get(3)?,
              metric_name:    r.get(4)?,
              model_used:     r.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawForecast::into_row).collect()
  }
}
