//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, calendar dates as `YYYY-MM-DD`,
//! UUIDs as hyphenated lowercase strings, and enums by their wire names.

use chrono::{DateTime, NaiveDate, Utc};
use opsintel_core::{
  frame::{self, Value},
  record::{
    Category, DetectionMethod, ForecastPoint, ForecastRow, Insight, InsightRule, Severity,
    StoredAnomaly,
  },
};
use rusqlite::types::Value as SqlValue;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> / NaiveDate ───────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { frame::format_date(d) }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  frame::parse_date(s).map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Cells ───────────────────────────────────────────────────────────────────

pub fn encode_value(v: Value) -> SqlValue {
  match v {
    Value::Null => SqlValue::Null,
    Value::Integer(i) => SqlValue::Integer(i),
    Value::Real(r) => SqlValue::Real(r),
    Value::Text(s) => SqlValue::Text(s),
  }
}

/// BLOBs never appear in fact tables; treat one as NULL rather than failing a
/// whole read.
pub fn decode_value(v: SqlValue) -> Value {
  match v {
    SqlValue::Null | SqlValue::Blob(_) => Value::Null,
    SqlValue::Integer(i) => Value::Integer(i),
    SqlValue::Real(r) => Value::Real(r),
    SqlValue::Text(s) => Value::Text(s),
  }
}

// ─── Enums ───────────────────────────────────────────────────────────────────

fn decode_enum<T: std::str::FromStr>(what: &'static str, s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::Decode { what, value: s.to_owned() })
}

pub fn decode_severity(s: &str) -> Result<Severity> { decode_enum("severity", s) }

pub fn decode_category(s: &str) -> Result<Category> { decode_enum("category", s) }

pub fn decode_rule(s: &str) -> Result<InsightRule> { decode_enum("insight rule", s) }

pub fn decode_method(s: &str) -> Result<DetectionMethod> {
  decode_enum("detection method", s)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from an `anomalies` row.
pub struct RawAnomaly {
  pub date:             String,
  pub metric_name:      String,
  pub metric_value:     f64,
  pub expected_value:   Option<f64>,
  pub anomaly_score:    f64,
  pub detection_method: String,
  pub run_id:           String,
  pub created_at:       String,
}

impl RawAnomaly {
  pub fn into_anomaly(self) -> Result<StoredAnomaly> {
    Ok(StoredAnomaly {
      date:             decode_date(&self.date)?,
      metric_name:      self.metric_name,
      metric_value:     self.metric_value,
      expected_value:   self.expected_value,
      anomaly_score:    self.anomaly_score,
      detection_method: decode_method(&self.detection_method)?,
      run_id:           decode_uuid(&self.run_id)?,
      created_at:       decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from an `insights` row.
pub struct RawInsight {
  pub date:         String,
  pub category:     String,
  pub rule:         String,
  pub insight_text: String,
  pub severity:     String,
  pub metric_value: Option<f64>,
}

impl RawInsight {
  pub fn into_insight(self) -> Result<Insight> {
    Ok(Insight {
      date:         decode_date(&self.date)?,
      category:     decode_category(&self.category)?,
      rule:         decode_rule(&self.rule)?,
      insight_text: self.insight_text,
      severity:     decode_severity(&self.severity)?,
      metric_value: self.metric_value,
    })
  }
}

/// Raw values read directly from a `forecasts` row.
pub struct RawForecast {
  pub date:           String,
  pub forecast_value: f64,
  pub lower_bound:    f64,
  pub upper_bound:    f64,
  pub metric_name:    String,
  pub model_used:     String,
}

impl RawForecast {
  pub fn into_row(self) -> Result<ForecastRow> {
    Ok(ForecastRow {
      metric_name: self.metric_name,
      model_used:  self.model_used,
      point:       ForecastPoint {
        date:           decode_date(&self.date)?,
        forecast_value: self.forecast_value,
        lower_bound:    self.lower_bound,
        upper_bound:    self.upper_bound,
      },
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn method_wire_names_decode() {
    assert_eq!(decode_method("z-score").unwrap(), DetectionMethod::ZScore);
    assert_eq!(
      decode_method("isolation_forest").unwrap(),
      DetectionMethod::IsolationForest
    );
    assert!(matches!(
      decode_method("prophet"),
      Err(Error::Decode { what: "detection method", .. })
    ));
  }

  #[test]
  fn blob_cells_read_as_null() {
    assert_eq!(decode_value(SqlValue::Blob(vec![1, 2])), Value::Null);
    assert_eq!(decode_value(SqlValue::Integer(4)), Value::Integer(4));
  }
}
